use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::client::CourierApi;
use crate::config::Config;
use crate::error::{ApiError, AppError};
use crate::models::delivery::{DeliveryItem, DeliveryRecord, DeliveryRequest};
use crate::models::location::{ContactPoint, GeoPoint};
use crate::models::pricing::{
    ActionAck, AddressValidation, PricingQuote, RoutingEstimate, WebhookSubscription,
};
use crate::models::tracking::TrackingUpdate;
use crate::observability::metrics::Metrics;

const MERCHANT_HEADER: &str = "x-merchant-id";
const WEBHOOK_EVENTS: [&str; 4] = ["pickup", "in_transit", "delivered", "failed"];

#[derive(Serialize)]
struct CreateDeliveryPayload<'a> {
    merchant_id: &'a str,
    order_id: &'a str,
    pickup: &'a ContactPoint,
    dropoff: &'a ContactPoint,
    items: &'a [DeliveryItem],
    value: f64,
    payment_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    special_instructions: Option<&'a str>,
}

pub struct HttpCourierApi {
    http: reqwest::Client,
    base_url: Url,
    merchant_id: String,
    metrics: Arc<Metrics>,
}

impl HttpCourierApi {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Result<Self, AppError> {
        let base_url = Url::parse(config.api_base_url())
            .map_err(|err| AppError::Configuration(format!("invalid CHOT_API_BASE: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(format!(
                "CHOT_API_BASE cannot be used as a base url: {base_url}"
            )));
        }

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|err| AppError::Configuration(format!("invalid CHOT_API_KEY: {err}")))?;
        authorization.set_sensitive(true);
        let merchant = HeaderValue::from_str(&config.merchant_id)
            .map_err(|err| AppError::Configuration(format!("invalid CHOT_MERCHANT_ID: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(HeaderName::from_static(MERCHANT_HEADER), merchant);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            merchant_id: config.merchant_id.clone(),
            metrics,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let result = execute(request).await;
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .observe_request(endpoint, outcome, started.elapsed().as_secs_f64());
        debug!(endpoint, outcome, "courier request finished");
        result
    }
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl CourierApi for HttpCourierApi {
    async fn pricing_quote(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        weight_kg: f64,
    ) -> Result<PricingQuote, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["pricing", "quote"]))
            .json(&json!({
                "pickup": pickup,
                "dropoff": dropoff,
                "weight": weight_kg,
                "items": 1,
            }));
        self.send("pricing_quote", request).await
    }

    async fn create_delivery(&self, request: &DeliveryRequest) -> Result<DeliveryRecord, ApiError> {
        let payload = CreateDeliveryPayload {
            merchant_id: &self.merchant_id,
            order_id: &request.order_id,
            pickup: &request.pickup,
            dropoff: &request.dropoff,
            items: &request.items,
            value: request.estimated_value,
            payment_type: request.payment_method.payment_type(),
            special_instructions: request.special_instructions.as_deref(),
        };
        let request = self
            .http
            .post(self.endpoint(&["delivery", "create"]))
            .json(&payload);
        self.send("delivery_create", request).await
    }

    async fn delivery_status(&self, delivery_id: &str) -> Result<DeliveryRecord, ApiError> {
        let request = self
            .http
            .get(self.endpoint(&["delivery", delivery_id, "status"]));
        self.send("delivery_status", request).await
    }

    async fn track_delivery(&self, delivery_id: &str) -> Result<TrackingUpdate, ApiError> {
        let request = self
            .http
            .get(self.endpoint(&["delivery", delivery_id, "track"]));
        self.send("delivery_track", request).await
    }

    async fn cancel_delivery(&self, delivery_id: &str, reason: &str) -> Result<ActionAck, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["delivery", delivery_id, "cancel"]))
            .json(&json!({ "reason": reason }));
        self.send("delivery_cancel", request).await
    }

    async fn rate_delivery(
        &self,
        delivery_id: &str,
        rating: u8,
        comment: &str,
    ) -> Result<ActionAck, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["delivery", delivery_id, "rate"]))
            .json(&json!({ "rating": rating, "comment": comment }));
        self.send("delivery_rate", request).await
    }

    async fn validate_address(
        &self,
        lat: f64,
        lng: f64,
        address: &str,
    ) -> Result<AddressValidation, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["address", "validate"]))
            .json(&json!({
                "latitude": lat,
                "longitude": lng,
                "address": address,
            }));
        self.send("address_validate", request).await
    }

    async fn routing_estimate(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<RoutingEstimate, ApiError> {
        let request = self
            .http
            .get(self.endpoint(&["routing", "estimate"]))
            .query(&[
                ("pickup_lat", pickup.lat),
                ("pickup_lng", pickup.lng),
                ("dropoff_lat", dropoff.lat),
                ("dropoff_lng", dropoff.lng),
            ]);
        self.send("routing_estimate", request).await
    }

    async fn subscribe(
        &self,
        delivery_id: &str,
        webhook_url: &str,
    ) -> Result<WebhookSubscription, ApiError> {
        let request = self
            .http
            .post(self.endpoint(&["delivery", "subscribe"]))
            .json(&json!({
                "delivery_id": delivery_id,
                "webhook_url": webhook_url,
                "events": WEBHOOK_EVENTS,
            }));
        self.send("delivery_subscribe", request).await
    }
}

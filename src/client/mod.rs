mod delivery;
mod http;
#[cfg(test)]
pub(crate) mod mock;
mod store;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::delivery::{DeliveryRecord, DeliveryRequest};
use crate::models::location::GeoPoint;
use crate::models::pricing::{
    ActionAck, AddressValidation, PricingQuote, RoutingEstimate, WebhookSubscription,
};
use crate::models::tracking::TrackingUpdate;

pub use delivery::{DEFAULT_CANCEL_REASON, DELIVERIES_KEY, DeliveryClient};
pub use http::HttpCourierApi;
pub use store::{FileStore, InMemoryStore, KeyValueStore};

/// Raw operations of the courier network. Implementations only move bytes
/// and decode them; attribution of failures and response checks happen in
/// [`DeliveryClient`].
#[async_trait]
pub trait CourierApi: Send + Sync {
    async fn pricing_quote(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        weight_kg: f64,
    ) -> Result<PricingQuote, ApiError>;

    async fn create_delivery(&self, request: &DeliveryRequest) -> Result<DeliveryRecord, ApiError>;

    async fn delivery_status(&self, delivery_id: &str) -> Result<DeliveryRecord, ApiError>;

    async fn track_delivery(&self, delivery_id: &str) -> Result<TrackingUpdate, ApiError>;

    async fn cancel_delivery(&self, delivery_id: &str, reason: &str) -> Result<ActionAck, ApiError>;

    async fn rate_delivery(
        &self,
        delivery_id: &str,
        rating: u8,
        comment: &str,
    ) -> Result<ActionAck, ApiError>;

    async fn validate_address(
        &self,
        lat: f64,
        lng: f64,
        address: &str,
    ) -> Result<AddressValidation, ApiError>;

    async fn routing_estimate(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<RoutingEstimate, ApiError>;

    async fn subscribe(
        &self,
        delivery_id: &str,
        webhook_url: &str,
    ) -> Result<WebhookSubscription, ApiError>;
}

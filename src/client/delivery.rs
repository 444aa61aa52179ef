use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{debug, error, info};

use crate::client::{CourierApi, KeyValueStore};
use crate::error::{ApiError, AppError};
use crate::models::delivery::{DeliveryRecord, DeliveryRequest};
use crate::models::location::GeoPoint;
use crate::models::pricing::{
    ActionAck, AddressValidation, PricingQuote, RoutingEstimate, WebhookSubscription,
};
use crate::models::tracking::TrackingUpdate;

pub const DELIVERIES_KEY: &str = "deliveries";
pub const DEFAULT_CANCEL_REASON: &str = "User requested cancellation";

/// Acknowledged cancellations remembered per process. When full the memory
/// is reset, after which a repeat cancel simply reaches the courier again.
const CANCELLED_MEMORY: usize = 4_096;

/// Typed entry point to the courier network plus the local mirror of the
/// deliveries created through it. Every remote failure surfaces as its own
/// [`AppError`] variant; nothing is retried here.
pub struct DeliveryClient {
    api: Arc<dyn CourierApi>,
    store: Arc<dyn KeyValueStore>,
    cancelled: DashSet<String>,
}

impl DeliveryClient {
    pub fn new(api: Arc<dyn CourierApi>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api,
            store,
            cancelled: DashSet::new(),
        }
    }

    pub async fn get_pricing_quote(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
        weight_kg: f64,
    ) -> Result<PricingQuote, AppError> {
        let quote = self
            .api
            .pricing_quote(pickup, dropoff, weight_kg)
            .await
            .map_err(AppError::Quote)?;
        quote
            .check()
            .map_err(|reason| AppError::Quote(ApiError::InvalidResponse(reason)))?;
        Ok(quote)
    }

    pub async fn create_delivery(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryRecord, AppError> {
        request.validate()?;

        let mut record = self
            .api
            .create_delivery(request)
            .await
            .map_err(AppError::DeliveryCreation)?;
        record
            .check()
            .map_err(|reason| AppError::DeliveryCreation(ApiError::InvalidResponse(reason)))?;
        if record.order_id != request.order_id {
            return Err(AppError::DeliveryCreation(ApiError::InvalidResponse(
                format!(
                    "delivery for order {} returned for order {}",
                    record.order_id, request.order_id
                ),
            )));
        }

        record.created_at = Some(Utc::now());
        if let Err(err) = self.append_cached(&record).await {
            error!(delivery_id = %record.delivery_id, error = %err, "failed to cache delivery");
        }

        info!(
            delivery_id = %record.delivery_id,
            order_id = %record.order_id,
            partner = %record.partner.name,
            "delivery created"
        );
        Ok(record)
    }

    pub async fn get_delivery_status(&self, delivery_id: &str) -> Result<DeliveryRecord, AppError> {
        let record = self
            .api
            .delivery_status(delivery_id)
            .await
            .map_err(AppError::StatusFetch)?;
        record
            .check()
            .map_err(|reason| AppError::StatusFetch(ApiError::InvalidResponse(reason)))?;
        Ok(record)
    }

    pub async fn track_delivery(&self, delivery_id: &str) -> Result<TrackingUpdate, AppError> {
        let update = self
            .api
            .track_delivery(delivery_id)
            .await
            .map_err(AppError::Tracking)?;
        if update.delivery_id != delivery_id {
            return Err(AppError::Tracking(ApiError::InvalidResponse(format!(
                "tracking update for {} returned for {delivery_id}",
                update.delivery_id
            ))));
        }
        Ok(update)
    }

    /// Once the courier has acknowledged a cancellation, repeated calls for
    /// the same delivery succeed locally without contacting it again.
    pub async fn cancel_delivery(
        &self,
        delivery_id: &str,
        reason: Option<&str>,
    ) -> Result<ActionAck, AppError> {
        if self.cancelled.contains(delivery_id) {
            debug!(delivery_id, "delivery already cancelled");
            return Ok(ActionAck { success: true });
        }

        let ack = self
            .api
            .cancel_delivery(delivery_id, reason.unwrap_or(DEFAULT_CANCEL_REASON))
            .await
            .map_err(AppError::Cancellation)?;
        if ack.success {
            if self.cancelled.len() >= CANCELLED_MEMORY {
                self.cancelled.clear();
            }
            self.cancelled.insert(delivery_id.to_string());
            info!(delivery_id, "delivery cancelled");
        }
        Ok(ack)
    }

    pub async fn rate_delivery(
        &self,
        delivery_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<ActionAck, AppError> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        self.api
            .rate_delivery(delivery_id, rating, comment.unwrap_or_default())
            .await
            .map_err(AppError::Rating)
    }

    pub async fn validate_address(
        &self,
        lat: f64,
        lng: f64,
        address: &str,
    ) -> Result<AddressValidation, AppError> {
        self.api
            .validate_address(lat, lng, address)
            .await
            .map_err(AppError::AddressValidation)
    }

    pub async fn get_estimated_time(
        &self,
        pickup_lat: f64,
        pickup_lng: f64,
        dropoff_lat: f64,
        dropoff_lng: f64,
    ) -> Result<RoutingEstimate, AppError> {
        let pickup = GeoPoint {
            lat: pickup_lat,
            lng: pickup_lng,
        };
        let dropoff = GeoPoint {
            lat: dropoff_lat,
            lng: dropoff_lng,
        };
        let estimate = self
            .api
            .routing_estimate(&pickup, &dropoff)
            .await
            .map_err(AppError::Estimation)?;
        if !estimate.distance_km.is_finite() || estimate.distance_km < 0.0 {
            return Err(AppError::Estimation(ApiError::InvalidResponse(format!(
                "distance {} is not a valid length",
                estimate.distance_km
            ))));
        }
        Ok(estimate)
    }

    /// Registers a webhook with the courier. The callbacks themselves are
    /// not consumed by this crate.
    pub async fn subscribe_to_updates(
        &self,
        delivery_id: &str,
        webhook_url: &str,
    ) -> Result<WebhookSubscription, AppError> {
        self.api
            .subscribe(delivery_id, webhook_url)
            .await
            .map_err(AppError::Subscription)
    }

    pub async fn list_cached_deliveries(&self) -> Result<Vec<DeliveryRecord>, AppError> {
        match self.store.get(DELIVERIES_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|err| {
                AppError::Persistence(format!("cached deliveries are unreadable: {err}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    pub async fn clear_cached_deliveries(&self) -> Result<(), AppError> {
        self.store.remove(DELIVERIES_KEY).await
    }

    async fn append_cached(&self, record: &DeliveryRecord) -> Result<(), AppError> {
        let mut deliveries = self.list_cached_deliveries().await?;
        deliveries.push(record.clone());
        let raw = serde_json::to_string(&deliveries).map_err(|err| {
            AppError::Persistence(format!("failed to serialize deliveries: {err}"))
        })?;
        self.store.put(DELIVERIES_KEY, raw).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::client::InMemoryStore;
    use crate::client::mock::{MockCourierApi, sample_record};
    use crate::models::delivery::{DeliveryItem, PaymentMethod};
    use crate::models::location::ContactPoint;

    fn client_with(api: Arc<MockCourierApi>) -> (DeliveryClient, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (DeliveryClient::new(api, store.clone()), store)
    }

    fn request(order_id: &str) -> DeliveryRequest {
        let contact = |lat, lng| ContactPoint {
            lat,
            lng,
            address: "somewhere".to_string(),
            name: "someone".to_string(),
            phone: "+91-9000000000".to_string(),
        };
        DeliveryRequest {
            order_id: order_id.to_string(),
            pickup: contact(28.6139, 77.2090),
            dropoff: contact(28.7041, 77.1025),
            items: vec![DeliveryItem {
                name: "Millet flour".to_string(),
                quantity: 2,
                weight: Some(0.5),
            }],
            estimated_value: 420.0,
            payment_method: PaymentMethod::Prepaid,
            special_instructions: None,
        }
    }

    #[tokio::test]
    async fn rating_outside_range_is_rejected_without_network() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _) = client_with(api.clone());

        for rating in [0, 6] {
            let result = client.rate_delivery("dlv-1", rating, None).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
        assert_eq!(api.calls("rate"), 0);

        for rating in [1, 5] {
            let ack = client.rate_delivery("dlv-1", rating, Some("quick")).await.unwrap();
            assert!(ack.success);
        }
        assert_eq!(api.calls("rate"), 2);
    }

    #[tokio::test]
    async fn created_deliveries_are_cached_in_call_order() {
        let (client, _) = client_with(Arc::new(MockCourierApi::new()));

        let first = client.create_delivery(&request("ord-1")).await.unwrap();
        let second = client.create_delivery(&request("ord-2")).await.unwrap();
        assert!(first.created_at.is_some());

        let cached = client.list_cached_deliveries().await.unwrap();
        let ids: Vec<_> = cached.iter().map(|r| r.delivery_id.as_str()).collect();
        assert_eq!(ids, vec![first.delivery_id.as_str(), second.delivery_id.as_str()]);

        client.clear_cached_deliveries().await.unwrap();
        assert!(client.list_cached_deliveries().await.unwrap().is_empty());
        client.clear_cached_deliveries().await.unwrap();
    }

    #[tokio::test]
    async fn failed_creation_leaves_cache_untouched() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _) = client_with(api.clone());
        client.create_delivery(&request("ord-1")).await.unwrap();

        api.create_fails.store(true, Ordering::SeqCst);
        let result = client.create_delivery(&request("ord-2")).await;

        assert!(matches!(result, Err(AppError::DeliveryCreation(_))));
        assert_eq!(client.list_cached_deliveries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_the_courier() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _) = client_with(api.clone());

        let mut bad = request("ord-1");
        bad.estimated_value = -1.0;

        assert!(matches!(
            client.create_delivery(&bad).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(api.calls("create"), 0);
    }

    #[tokio::test]
    async fn empty_cache_lists_nothing() {
        let (client, _) = client_with(Arc::new(MockCourierApi::new()));
        assert!(client.list_cached_deliveries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_is_a_persistence_error() {
        let (client, store) = client_with(Arc::new(MockCourierApi::new()));
        store.put(DELIVERIES_KEY, "{not json".to_string()).await.unwrap();

        assert!(matches!(
            client.list_cached_deliveries().await,
            Err(AppError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn quote_failure_is_a_quote_error() {
        let api = Arc::new(MockCourierApi::new());
        *api.quote.lock().unwrap() = None;
        let (client, _) = client_with(api);
        let point = GeoPoint { lat: 0.0, lng: 0.0 };

        assert!(matches!(
            client.get_pricing_quote(&point, &point, 1.0).await,
            Err(AppError::Quote(_))
        ));
    }

    #[tokio::test]
    async fn inconsistent_quote_is_rejected() {
        let api = Arc::new(MockCourierApi::new());
        if let Some(quote) = api.quote.lock().unwrap().as_mut() {
            quote.total_price = 1.0;
        }
        let (client, _) = client_with(api);
        let point = GeoPoint { lat: 0.0, lng: 0.0 };

        assert!(matches!(
            client.get_pricing_quote(&point, &point, 1.0).await,
            Err(AppError::Quote(ApiError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn status_with_out_of_range_rating_is_rejected() {
        let api = Arc::new(MockCourierApi::new());
        let mut record = sample_record("dlv-1", "ord-1");
        record.partner.rating = 9.0;
        *api.status.lock().unwrap() = Some(record);
        let (client, _) = client_with(api);

        assert!(matches!(
            client.get_delivery_status("dlv-1").await,
            Err(AppError::StatusFetch(ApiError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn second_cancel_does_not_call_the_courier_again() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _) = client_with(api.clone());

        assert!(client.cancel_delivery("dlv-1", None).await.unwrap().success);
        assert!(client.cancel_delivery("dlv-1", Some("changed my mind")).await.unwrap().success);
        assert_eq!(api.calls("cancel"), 1);
    }

    #[tokio::test]
    async fn cancel_memory_is_bounded() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _store) = client_with(api.clone());

        for n in 0..=CANCELLED_MEMORY {
            client.cancel_delivery(&format!("dlv-{n}"), None).await.unwrap();
        }
        assert_eq!(client.cancelled.len(), 1);

        client.cancel_delivery("dlv-0", None).await.unwrap();
        assert_eq!(api.calls("cancel"), CANCELLED_MEMORY + 2);
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
            Ok(None)
        }

        async fn put(&self, _key: &str, _value: String) -> Result<(), AppError> {
            Err(AppError::Persistence("disk full".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cache_failure_still_returns_the_created_delivery() {
        let api = Arc::new(MockCourierApi::new());
        let client = DeliveryClient::new(api.clone(), Arc::new(BrokenStore));

        let record = client.create_delivery(&request("ord-5")).await.unwrap();

        assert_eq!(record.order_id, "ord-5");
        assert!(record.created_at.is_some());
        assert_eq!(api.calls("create"), 1);
        assert!(client.list_cached_deliveries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_cancel_can_be_retried() {
        let api = Arc::new(MockCourierApi::new());
        let (client, _) = client_with(api.clone());

        api.cancel_fails.store(true, Ordering::SeqCst);
        assert!(matches!(
            client.cancel_delivery("dlv-1", None).await,
            Err(AppError::Cancellation(_))
        ));

        api.cancel_fails.store(false, Ordering::SeqCst);
        assert!(client.cancel_delivery("dlv-1", None).await.unwrap().success);
        assert_eq!(api.calls("cancel"), 2);
    }

    #[tokio::test]
    async fn tracking_failure_is_a_tracking_error() {
        let (client, _) = client_with(Arc::new(MockCourierApi::with_tracking(vec![None])));
        assert!(matches!(
            client.track_delivery("dlv-1").await,
            Err(AppError::Tracking(_))
        ));
    }

    #[tokio::test]
    async fn estimate_and_address_errors_are_distinct() {
        let api = Arc::new(MockCourierApi::new());
        *api.address.lock().unwrap() = None;
        *api.estimate.lock().unwrap() = None;
        let (client, _) = client_with(api);

        assert!(matches!(
            client.validate_address(28.7, 77.1, "12 MG Road").await,
            Err(AppError::AddressValidation(_))
        ));
        assert!(matches!(
            client.get_estimated_time(28.6, 77.2, 28.7, 77.1).await,
            Err(AppError::Estimation(_))
        ));
    }
}

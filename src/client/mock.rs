//! Scriptable in-process courier used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::client::CourierApi;
use crate::error::ApiError;
use crate::models::delivery::{DeliveryRecord, DeliveryRequest, DeliveryStatus, Partner};
use crate::models::location::GeoPoint;
use crate::models::pricing::{
    ActionAck, AddressValidation, PricingQuote, RoutingEstimate, WebhookSubscription,
};
use crate::models::tracking::TrackingUpdate;

pub(crate) fn unavailable() -> ApiError {
    ApiError::Status {
        status: 503,
        body: "courier unavailable".to_string(),
    }
}

pub(crate) fn sample_quote() -> PricingQuote {
    PricingQuote {
        base_price: 50.0,
        distance_price: 70.0,
        weight_price: 15.0,
        total_price: 135.0,
        estimated_time: 40,
        currency: "INR".to_string(),
    }
}

pub(crate) fn sample_record(delivery_id: &str, order_id: &str) -> DeliveryRecord {
    DeliveryRecord {
        delivery_id: delivery_id.to_string(),
        order_id: order_id.to_string(),
        partner: Partner {
            name: "Ravi".to_string(),
            phone: "+91-9000000000".to_string(),
            rating: 4.6,
            vehicle_type: "bike".to_string(),
        },
        estimated_pickup_time: 15,
        estimated_delivery_time: 40,
        tracking_url: format!("https://track.test/{delivery_id}"),
        status: DeliveryStatus::Assigned,
        created_at: None,
    }
}

/// Each endpoint either answers with its configured value or fails with a
/// 503. Tracking replays a script: `Some(status)` answers, `None` fails the
/// tick, and an exhausted script fails every later call.
pub(crate) struct MockCourierApi {
    pub(crate) quote: Mutex<Option<PricingQuote>>,
    pub(crate) create_fails: AtomicBool,
    pub(crate) last_create: Mutex<Option<DeliveryRequest>>,
    pub(crate) status: Mutex<Option<DeliveryRecord>>,
    pub(crate) tracking: Mutex<VecDeque<Option<DeliveryStatus>>>,
    /// When set, each tracking call waits for a permit before answering.
    pub(crate) track_gate: Mutex<Option<Arc<Notify>>>,
    pub(crate) cancel_fails: AtomicBool,
    pub(crate) address: Mutex<Option<AddressValidation>>,
    pub(crate) estimate: Mutex<Option<RoutingEstimate>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    next_id: AtomicUsize,
}

impl MockCourierApi {
    pub(crate) fn new() -> Self {
        Self {
            quote: Mutex::new(Some(sample_quote())),
            create_fails: AtomicBool::new(false),
            last_create: Mutex::new(None),
            status: Mutex::new(None),
            tracking: Mutex::new(VecDeque::new()),
            track_gate: Mutex::new(None),
            cancel_fails: AtomicBool::new(false),
            address: Mutex::new(Some(AddressValidation {
                is_valid: true,
                serviceable: true,
                message: None,
            })),
            estimate: Mutex::new(Some(RoutingEstimate {
                estimated_minutes: 38,
                distance_km: 14.4,
            })),
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub(crate) fn with_tracking(statuses: Vec<Option<DeliveryStatus>>) -> Self {
        let api = Self::new();
        *api.tracking.lock().unwrap() = statuses.into();
        api
    }

    pub(crate) fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, endpoint: &'static str) {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
    }
}

#[async_trait]
impl CourierApi for MockCourierApi {
    async fn pricing_quote(
        &self,
        _pickup: &GeoPoint,
        _dropoff: &GeoPoint,
        _weight_kg: f64,
    ) -> Result<PricingQuote, ApiError> {
        self.record("quote");
        self.quote.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn create_delivery(&self, request: &DeliveryRequest) -> Result<DeliveryRecord, ApiError> {
        self.record("create");
        *self.last_create.lock().unwrap() = Some(request.clone());
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(sample_record(&format!("dlv-{n}"), &request.order_id))
    }

    async fn delivery_status(&self, delivery_id: &str) -> Result<DeliveryRecord, ApiError> {
        self.record("status");
        match self.status.lock().unwrap().clone() {
            Some(record) => Ok(record),
            None => Ok(sample_record(delivery_id, "ord-1")),
        }
    }

    async fn track_delivery(&self, delivery_id: &str) -> Result<TrackingUpdate, ApiError> {
        self.record("track");
        let gate = self.track_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.tracking.lock().unwrap().pop_front().flatten();
        let status = next.ok_or_else(unavailable)?;
        Ok(TrackingUpdate {
            delivery_id: delivery_id.to_string(),
            status,
            location: Some(GeoPoint {
                lat: 28.65,
                lng: 77.15,
            }),
            timestamp: Utc::now(),
            partner_name: Some("Ravi".to_string()),
            estimated_arrival: Some(12),
            notes: None,
        })
    }

    async fn cancel_delivery(&self, _delivery_id: &str, _reason: &str) -> Result<ActionAck, ApiError> {
        self.record("cancel");
        if self.cancel_fails.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(ActionAck { success: true })
    }

    async fn rate_delivery(
        &self,
        _delivery_id: &str,
        _rating: u8,
        _comment: &str,
    ) -> Result<ActionAck, ApiError> {
        self.record("rate");
        Ok(ActionAck { success: true })
    }

    async fn validate_address(
        &self,
        _lat: f64,
        _lng: f64,
        _address: &str,
    ) -> Result<AddressValidation, ApiError> {
        self.record("address");
        self.address.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn routing_estimate(
        &self,
        _pickup: &GeoPoint,
        _dropoff: &GeoPoint,
    ) -> Result<RoutingEstimate, ApiError> {
        self.record("estimate");
        self.estimate.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn subscribe(
        &self,
        delivery_id: &str,
        _webhook_url: &str,
    ) -> Result<WebhookSubscription, ApiError> {
        self.record("subscribe");
        Ok(WebhookSubscription {
            subscription_id: format!("sub-{delivery_id}"),
        })
    }
}

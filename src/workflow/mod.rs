mod checkout;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::DeliveryClient;
use crate::config::Config;
use crate::error::AppError;
use crate::geo::{fallback_cost, format_duration, haversine_km};
use crate::models::delivery::{DeliveryItem, DeliveryRecord, DeliveryRequest, PaymentMethod};
use crate::models::location::{ContactPoint, GeoPoint};
use crate::models::order::{CartItem, DeliveryAddress, cart_subtotal};
use crate::models::pricing::{ActionAck, PricingQuote};
use crate::models::tracking::TrackingUpdate;
use crate::tracking::{Tracker, TrackingHandle};

pub use checkout::{Checkout, CheckoutOutcome, DELIVERY_PENDING_MESSAGE};

pub const ITEM_WEIGHT_KG: f64 = 0.5;
pub const FALLBACK_DISTANCE: &str = "Unknown";
pub const FALLBACK_ETA: &str = "30-45 mins";
pub const FALLBACK_ETA_MINUTES: u32 = 45;
pub const HANDLING_INSTRUCTIONS: &str =
    "Fresh organic products - handle with care. Keep refrigerated if needed.";

const OUTSIDE_AREA: &str = "This address is outside our delivery area";
const SERVICEABLE: &str = "Address is serviceable";
const VALIDATION_UNAVAILABLE: &str = "Unable to validate address. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressCheck {
    pub is_valid: bool,
    pub message: String,
}

impl AddressCheck {
    fn rejected(message: &str) -> Self {
        Self {
            is_valid: false,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryQuote {
    pub delivery_fee: f64,
    /// Fee the shopper pays once the free-delivery threshold is applied.
    pub payable_fee: f64,
    pub distance: String,
    pub estimated_time: String,
    /// Locally computed price, present only when the courier quote failed.
    pub local_estimate: Option<f64>,
    pub raw: Option<PricingQuote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtaSummary {
    pub estimated_minutes: u32,
    pub distance: String,
    pub formatted: String,
}

/// Sequences address validation, pricing, delivery creation and tracking
/// for a checkout. Holds no state of its own between calls.
#[derive(Clone)]
pub struct Workflow {
    config: Arc<Config>,
    client: Arc<DeliveryClient>,
    tracker: Tracker,
}

impl Workflow {
    pub fn new(config: Arc<Config>, client: Arc<DeliveryClient>, tracker: Tracker) -> Self {
        Self {
            config,
            client,
            tracker,
        }
    }

    pub fn client(&self) -> &Arc<DeliveryClient> {
        &self.client
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub async fn validate_delivery_address(&self, address: &DeliveryAddress) -> AddressCheck {
        let distance_km = haversine_km(&self.config.store.point(), &address.point());
        if distance_km > self.config.max_delivery_radius_km {
            info!(
                distance_km,
                max_radius_km = self.config.max_delivery_radius_km,
                "address beyond delivery radius"
            );
            return AddressCheck::rejected(OUTSIDE_AREA);
        }

        match self
            .client
            .validate_address(address.lat, address.lng, &address.full_line())
            .await
        {
            Ok(validation) if validation.serviceable => AddressCheck {
                is_valid: true,
                message: SERVICEABLE.to_string(),
            },
            Ok(validation) => {
                debug!(message = ?validation.message, "address not serviceable");
                AddressCheck::rejected(OUTSIDE_AREA)
            }
            Err(err) => {
                error!(error = %err, "address validation failed");
                AddressCheck::rejected(VALIDATION_UNAVAILABLE)
            }
        }
    }

    pub async fn get_delivery_quote(
        &self,
        customer_lat: f64,
        customer_lng: f64,
        cart_items: &[CartItem],
    ) -> DeliveryQuote {
        let store = self.config.store.point();
        let customer = GeoPoint {
            lat: customer_lat,
            lng: customer_lng,
        };
        let weight_kg = ITEM_WEIGHT_KG * cart_items.len() as f64;
        let free_delivery = self
            .config
            .pricing
            .qualifies_for_free_delivery(cart_subtotal(cart_items));
        let payable = |fee: f64| if free_delivery { 0.0 } else { fee };

        match self.client.get_pricing_quote(&store, &customer, weight_kg).await {
            Ok(quote) => {
                debug!(total = quote.total_price, "delivery quote received");
                DeliveryQuote {
                    delivery_fee: quote.total_price,
                    payable_fee: payable(quote.total_price),
                    distance: format!("{:.1}", haversine_km(&store, &customer)),
                    estimated_time: format_duration(quote.estimated_time),
                    local_estimate: None,
                    raw: Some(quote),
                }
            }
            Err(err) => {
                warn!(error = %err, "delivery quote unavailable, using fallback fee");
                DeliveryQuote {
                    delivery_fee: self.config.fallback_fee,
                    payable_fee: payable(self.config.fallback_fee),
                    distance: FALLBACK_DISTANCE.to_string(),
                    estimated_time: FALLBACK_ETA.to_string(),
                    local_estimate: Some(fallback_cost(
                        &store,
                        &customer,
                        weight_kg,
                        &self.config.pricing,
                    )),
                    raw: None,
                }
            }
        }
    }

    pub async fn get_estimated_delivery_time(&self, customer_lat: f64, customer_lng: f64) -> EtaSummary {
        let store = &self.config.store;
        match self
            .client
            .get_estimated_time(store.lat, store.lng, customer_lat, customer_lng)
            .await
        {
            Ok(estimate) => EtaSummary {
                estimated_minutes: estimate.estimated_minutes,
                distance: format!("{:.1}", estimate.distance_km),
                formatted: format_duration(estimate.estimated_minutes),
            },
            Err(err) => {
                warn!(error = %err, "delivery estimate unavailable");
                EtaSummary {
                    estimated_minutes: FALLBACK_ETA_MINUTES,
                    distance: FALLBACK_DISTANCE.to_string(),
                    formatted: FALLBACK_ETA.to_string(),
                }
            }
        }
    }

    /// Asks the courier to pick the order up from the store. Failures are
    /// returned to the caller, which decides how checkout proceeds.
    pub async fn create_order_delivery(
        &self,
        order_id: &str,
        cart_items: &[CartItem],
        address: &DeliveryAddress,
        total_amount: f64,
        payment_method: PaymentMethod,
    ) -> Result<DeliveryRecord, AppError> {
        let store = &self.config.store;
        let request = DeliveryRequest {
            order_id: order_id.to_string(),
            pickup: ContactPoint {
                lat: store.lat,
                lng: store.lng,
                address: store.address.clone(),
                name: store.name.clone(),
                phone: store.phone.clone(),
            },
            dropoff: ContactPoint {
                lat: address.lat,
                lng: address.lng,
                address: address.single_line(),
                name: address.name.clone(),
                phone: address.phone.clone(),
            },
            items: cart_items
                .iter()
                .map(|item| DeliveryItem {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    weight: Some(ITEM_WEIGHT_KG),
                })
                .collect(),
            estimated_value: total_amount,
            payment_method,
            special_instructions: Some(HANDLING_INSTRUCTIONS.to_string()),
        };

        match self.client.create_delivery(&request).await {
            Ok(record) => {
                if !self
                    .config
                    .time_estimates
                    .covers(record.estimated_pickup_time, record.estimated_delivery_time)
                {
                    warn!(
                        order_id,
                        pickup_minutes = record.estimated_pickup_time,
                        delivery_minutes = record.estimated_delivery_time,
                        "courier estimate outside advertised window"
                    );
                }
                Ok(record)
            }
            Err(err) => {
                error!(order_id, error = %err, "failed to create delivery order");
                Err(err)
            }
        }
    }

    pub fn start_delivery_tracking<F>(&self, delivery_id: &str, on_update: F) -> TrackingHandle
    where
        F: Fn(TrackingUpdate) + Send + Sync + 'static,
    {
        self.tracker.start_tracking(delivery_id, on_update)
    }

    pub async fn cancel_delivery_order(
        &self,
        delivery_id: &str,
        reason: Option<&str>,
    ) -> Result<ActionAck, AppError> {
        info!(delivery_id, reason = ?reason, "cancelling delivery");
        self.client
            .cancel_delivery(delivery_id, reason)
            .await
            .inspect_err(|err| error!(delivery_id, error = %err, "failed to cancel delivery"))
    }

    pub async fn rate_delivery_partner(
        &self,
        delivery_id: &str,
        rating: u8,
        feedback: Option<&str>,
    ) -> Result<ActionAck, AppError> {
        self.client
            .rate_delivery(delivery_id, rating, feedback)
            .await
            .inspect_err(|err| error!(delivery_id, error = %err, "failed to rate delivery"))
    }
}

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::delivery::{DeliveryRecord, PaymentMethod};
use crate::models::order::{CartItem, DeliveryAddress};
use crate::models::tracking::TrackingUpdate;
use crate::tracking::TrackingHandle;
use crate::workflow::{DeliveryQuote, Workflow};

pub const DELIVERY_PENDING_MESSAGE: &str = "Order confirmed, delivery assignment pending";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub order_id: String,
    pub items: Vec<CartItem>,
    pub address: DeliveryAddress,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
}

#[derive(Serialize)]
pub struct CheckoutOutcome {
    pub order_id: String,
    pub quote: DeliveryQuote,
    pub delivery: Option<DeliveryRecord>,
    pub message: String,
    #[serde(skip)]
    pub tracking: Option<TrackingHandle>,
}

impl Workflow {
    /// Runs a whole checkout: an unserviceable address aborts it, a failed
    /// quote degrades to the fallback fee, and a failed delivery creation
    /// still confirms the order with the assignment marked pending.
    pub async fn complete_order_flow<F>(
        &self,
        checkout: &Checkout,
        on_update: F,
    ) -> Result<CheckoutOutcome, AppError>
    where
        F: Fn(TrackingUpdate) + Send + Sync + 'static,
    {
        let address_check = self.validate_delivery_address(&checkout.address).await;
        if !address_check.is_valid {
            return Err(AppError::Validation(address_check.message));
        }

        let quote = self
            .get_delivery_quote(checkout.address.lat, checkout.address.lng, &checkout.items)
            .await;

        let delivery = match self
            .create_order_delivery(
                &checkout.order_id,
                &checkout.items,
                &checkout.address,
                checkout.total_amount,
                checkout.payment_method,
            )
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(order_id = %checkout.order_id, error = %err, "delivery assignment pending");
                return Ok(CheckoutOutcome {
                    order_id: checkout.order_id.clone(),
                    quote,
                    delivery: None,
                    message: DELIVERY_PENDING_MESSAGE.to_string(),
                    tracking: None,
                });
            }
        };

        let tracking = self.start_delivery_tracking(&delivery.delivery_id, on_update);
        info!(
            order_id = %checkout.order_id,
            delivery_id = %delivery.delivery_id,
            "checkout completed"
        );

        Ok(CheckoutOutcome {
            order_id: checkout.order_id.clone(),
            message: format!("Delivery assigned to {}", delivery.partner.name),
            quote,
            delivery: Some(delivery),
            tracking: Some(tracking),
        })
    }
}

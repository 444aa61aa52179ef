use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::location::ContactPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "cod")]
    CashOnDelivery,
    #[serde(rename = "prepaid")]
    Prepaid,
}

impl PaymentMethod {
    /// Value of the `payment_type` field the courier expects.
    pub fn payment_type(self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash",
            PaymentMethod::Prepaid => "prepaid",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub order_id: String,
    pub pickup: ContactPoint,
    pub dropoff: ContactPoint,
    pub items: Vec<DeliveryItem>,
    pub estimated_value: f64,
    pub payment_method: PaymentMethod,
    pub special_instructions: Option<String>,
}

impl DeliveryRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.order_id.trim().is_empty() {
            return Err(AppError::Validation("order id cannot be empty".to_string()));
        }
        if self.items.is_empty() {
            return Err(AppError::Validation(
                "delivery must contain at least one item".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(AppError::Validation(format!(
                "item {} has zero quantity",
                item.name
            )));
        }
        if !self.estimated_value.is_finite() || self.estimated_value < 0.0 {
            return Err(AppError::Validation(
                "estimated value must be a non-negative amount".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    Pending,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "Partner Assigned",
            DeliveryStatus::Pending => "Pending Pickup",
            DeliveryStatus::PickedUp => "Order Picked Up",
            DeliveryStatus::InTransit => "On the Way",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Failed => "Delivery Failed",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    #[serde(rename = "partnerName")]
    pub name: String,
    #[serde(rename = "partnerPhone")]
    pub phone: String,
    #[serde(rename = "partnerRating")]
    pub rating: f64,
    #[serde(rename = "vehicleType")]
    pub vehicle_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub delivery_id: String,
    pub order_id: String,
    #[serde(flatten)]
    pub partner: Partner,
    pub estimated_pickup_time: u32,
    pub estimated_delivery_time: u32,
    pub tracking_url: String,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Shape checks serde cannot express.
    pub fn check(&self) -> Result<(), String> {
        if self.delivery_id.trim().is_empty() {
            return Err("deliveryId is empty".to_string());
        }
        if !(0.0..=5.0).contains(&self.partner.rating) {
            return Err(format!(
                "partnerRating {} outside [0, 5]",
                self.partner.rating
            ));
        }
        Ok(())
    }
}

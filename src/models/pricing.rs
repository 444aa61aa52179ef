use serde::{Deserialize, Serialize};

const TOTAL_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingQuote {
    pub base_price: f64,
    pub distance_price: f64,
    pub weight_price: f64,
    pub total_price: f64,
    pub estimated_time: u32,
    pub currency: String,
}

impl PricingQuote {
    pub fn check(&self) -> Result<(), String> {
        let parts = self.base_price + self.distance_price + self.weight_price;
        if (parts - self.total_price).abs() > TOTAL_TOLERANCE {
            return Err(format!(
                "totalPrice {} does not match its parts ({parts})",
                self.total_price
            ));
        }
        if self.total_price < 0.0 {
            return Err("totalPrice is negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingEstimate {
    pub estimated_minutes: u32,
    #[serde(rename = "distance")]
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    pub is_valid: bool,
    pub serviceable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub subscription_id: String,
}

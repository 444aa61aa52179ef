use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

pub fn cart_subtotal(items: &[CartItem]) -> f64 {
    items
        .iter()
        .map(|item| item.unit_price * f64::from(item.quantity))
        .sum()
}

/// A shopper's saved address, with the coordinates picked on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub lat: f64,
    pub lng: f64,
}

impl DeliveryAddress {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn single_line(&self) -> String {
        match self.address_line2.as_deref().filter(|line| !line.is_empty()) {
            Some(line2) => format!("{}, {}", self.address_line1, line2),
            None => self.address_line1.clone(),
        }
    }

    pub fn full_line(&self) -> String {
        format!("{}, {}, {}", self.address_line1, self.city, self.pincode)
    }
}

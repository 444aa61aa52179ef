use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A pickup or drop-off point together with the person to call there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub name: String,
    pub phone: String,
}

pub mod delivery;
pub mod location;
pub mod order;
pub mod pricing;
pub mod tracking;

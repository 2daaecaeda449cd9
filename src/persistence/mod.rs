//! Persistence Layer for Shipment State
//!
//! Optional write-through of Blackboard entries and startup hydration.

pub mod shipment_store;

#[cfg(test)]
pub use shipment_store::MockShipmentStore;
pub use shipment_store::{PostgresShipmentStore, ShipmentStore};

//! Aggregates for the inventory service.

pub mod inventory;

pub use inventory::{InventoryAction, InventoryEnvironment, InventoryReducer, InventoryState};

//! HTTP handlers shared by every service.

pub mod health;

pub use health::{health_check, store_readiness};

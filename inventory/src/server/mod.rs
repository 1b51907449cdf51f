//! HTTP server for the inventory service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Router configuration
//! - Graceful shutdown handling

pub mod routes;
pub mod state;

pub use routes::{build_router, shutdown_signal};
pub use state::AppState;

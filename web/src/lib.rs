//! Axum integration for the boxoffice service.
//!
//! The HTTP layer is the imperative shell around the store:
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** caller identity, idempotency key and body
//! 3. **Build Action** from extracted data
//! 4. **Dispatch** the action through the `Store`
//! 5. **Map result** to an HTTP response (`AppError` for failures)
//!
//! This crate holds the domain-independent pieces: error mapping,
//! correlation-id middleware, header extractors and health handlers.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, IdempotencyKey};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

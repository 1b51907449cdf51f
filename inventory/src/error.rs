//! Error types for inventory operations.

use crate::types::{AlertId, BulkOperationId, EventId, HoldId, HoldStatus, TicketTypeId};
use boxoffice_runtime::StoreError;
use boxoffice_web::AppError;
use thiserror::Error;

/// Errors returned by inventory commands and queries.
///
/// Errors travel inside store actions, so the type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Request exceeds the available quantity
    #[error("Only {available} available (requested {requested})")]
    InsufficientInventory {
        /// Quantity asked for
        requested: u32,
        /// Quantity available
        available: u32,
    },

    /// No hold with this id
    #[error("Hold {0} not found")]
    HoldNotFound(HoldId),

    /// Hold is expired or released and cannot change any more
    #[error("Hold {hold_id} is {status}; create a new hold")]
    HoldNotActive {
        /// Hold id
        hold_id: HoldId,
        /// Observed status
        status: HoldStatus,
    },

    /// No inventory record for this ticket type (in this event)
    #[error("Ticket type {0} not found")]
    TicketTypeNotFound(TicketTypeId),

    /// No ticket type registered for this event
    #[error("Event {0} has no inventory")]
    EventNotFound(EventId),

    /// No alert with this id
    #[error("Alert {0} not found")]
    AlertNotFound(AlertId),

    /// No bulk operation with this id
    #[error("Bulk operation {0} not found")]
    BulkOperationNotFound(BulkOperationId),

    /// Malformed or disallowed request
    #[error("{0}")]
    Validation(String),

    /// A mutation would have left `sold + held > total`; it was rejected
    #[error(
        "Inventory invariant violated for ticket type {ticket_type_id}: sold {sold} + held {held} > total {total}"
    )]
    InvariantViolation {
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Sold quantity the mutation would have produced
        sold: u32,
        /// Held quantity the mutation would have produced
        held: u32,
        /// Total quantity
        total: u32,
    },

    /// Caller lacks a capability
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Caller could not be identified
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The store could not process the command
    #[error("Inventory store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time
    #[error("Timed out waiting for the inventory store")]
    Timeout,
}

impl InventoryError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            Self::HoldNotFound(_) => "HOLD_NOT_FOUND",
            Self::HoldNotActive { .. } => "HOLD_NOT_ACTIVE",
            Self::TicketTypeNotFound(_) => "TICKET_TYPE_NOT_FOUND",
            Self::EventNotFound(_) => "EVENT_NOT_FOUND",
            Self::AlertNotFound(_) => "ALERT_NOT_FOUND",
            Self::BulkOperationNotFound(_) => "BULK_OPERATION_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Shorthand for [`InventoryError::Validation`]
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => Self::Timeout,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        let code = err.code();
        match err {
            InventoryError::InsufficientInventory { .. } | InventoryError::HoldNotActive { .. } => {
                Self::conflict_with_code(err.to_string(), code)
            },
            InventoryError::HoldNotFound(id) => Self::not_found("Hold", id),
            InventoryError::TicketTypeNotFound(id) => Self::not_found("Ticket type", id),
            InventoryError::EventNotFound(id) => Self::not_found("Event", id),
            InventoryError::AlertNotFound(id) => Self::not_found("Alert", id),
            InventoryError::BulkOperationNotFound(id) => Self::not_found("Bulk operation", id),
            InventoryError::Validation(message) => Self::validation(message),
            InventoryError::InvariantViolation { .. } => Self::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Inventory is inconsistent and needs manual reconciliation".to_string(),
                code.to_string(),
            )
            .with_source(anyhow::Error::new(err)),
            InventoryError::Forbidden(message) => Self::forbidden(message),
            InventoryError::Unauthorized(message) => Self::unauthorized(message),
            InventoryError::Unavailable(message) => Self::unavailable(message),
            InventoryError::Timeout => Self::timeout(err.to_string()),
        }
    }
}

/// Result alias for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn insufficient_inventory_message() {
        let err = InventoryError::InsufficientInventory {
            requested: 7,
            available: 6,
        };
        assert_eq!(err.to_string(), "Only 6 available (requested 7)");
    }

    #[test]
    fn http_mapping() {
        let cases = [
            (
                InventoryError::InsufficientInventory {
                    requested: 2,
                    available: 1,
                },
                StatusCode::CONFLICT,
            ),
            (InventoryError::HoldNotFound(HoldId::new()), StatusCode::NOT_FOUND),
            (
                InventoryError::TicketTypeNotFound(TicketTypeId::new()),
                StatusCode::NOT_FOUND,
            ),
            (
                InventoryError::validation("quantity must be positive"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                InventoryError::InvariantViolation {
                    ticket_type_id: TicketTypeId::new(),
                    sold: 6,
                    held: 5,
                    total: 10,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (InventoryError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (InventoryError::Unauthorized("who".into()), StatusCode::UNAUTHORIZED),
            (InventoryError::Timeout, StatusCode::REQUEST_TIMEOUT),
        ];

        for (err, status) in cases {
            let code = err.code();
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            if status != StatusCode::NOT_FOUND {
                assert_eq!(app.code(), code);
            }
        }
    }

    #[test]
    fn store_errors_become_unavailable() {
        assert_eq!(
            InventoryError::from(StoreError::ShutdownInProgress).code(),
            "SERVICE_UNAVAILABLE"
        );
        assert_eq!(InventoryError::from(StoreError::Timeout), InventoryError::Timeout);
    }
}

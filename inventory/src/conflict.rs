//! Conflict resolution for hold requests that exceed availability.
//!
//! The resolver is a pure function of the policy, the request and the
//! availability observed inside the same reducer step, so there is no window
//! between reading availability and deciding.

use crate::types::{
    ConflictId, ConflictResolution, EventId, ResolutionType, SessionId, TicketTypeId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configured strategy for quantity conflicts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Grant what is left, deny when nothing is left
    #[default]
    PartialFulfill,
    /// Grant nothing
    DenyRequest,
    /// Record the request as queued, grant nothing now
    QueueRequest,
}

impl ConflictPolicy {
    /// Wire name of the policy
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PartialFulfill => "partial-fulfill",
            Self::DenyRequest => "deny-request",
            Self::QueueRequest => "queue-request",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partial-fulfill" | "partial_fulfill" => Ok(Self::PartialFulfill),
            "deny-request" | "deny_request" => Ok(Self::DenyRequest),
            "queue-request" | "queue_request" => Ok(Self::QueueRequest),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// A hold request that asked for more than was available.
#[derive(Clone, Debug)]
pub struct ConflictRequest<'a> {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Requesting session
    pub session_id: &'a SessionId,
    /// Quantity asked for
    pub requested: u32,
    /// Quantity available right now
    pub available: u32,
}

/// Decide the outcome of a conflicting request.
///
/// `resolved_quantity` on the returned record is what the caller may grant.
#[must_use]
pub fn resolve(
    policy: ConflictPolicy,
    request: &ConflictRequest<'_>,
    now: DateTime<Utc>,
) -> ConflictResolution {
    let (resolution_type, resolved_quantity, message) = match policy {
        ConflictPolicy::PartialFulfill if request.available > 0 => (
            ResolutionType::PartialFulfill,
            request.available,
            format!(
                "Only {} tickets available. Partial fulfillment offered.",
                request.available
            ),
        ),
        ConflictPolicy::PartialFulfill | ConflictPolicy::DenyRequest => (
            ResolutionType::DenyRequest,
            0,
            "Requested quantity not available".to_string(),
        ),
        ConflictPolicy::QueueRequest => (
            ResolutionType::QueueRequest,
            0,
            format!(
                "Request for {} tickets queued; {} currently available",
                request.requested, request.available
            ),
        ),
    };

    ConflictResolution {
        id: ConflictId::new(),
        event_id: request.event_id,
        ticket_type_id: request.ticket_type_id,
        session_id: request.session_id.clone(),
        requested_quantity: request.requested,
        available_quantity: request.available,
        resolution_type,
        resolved_quantity,
        message,
        timestamp: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(session: &SessionId, requested: u32, available: u32) -> ConflictRequest<'_> {
        ConflictRequest {
            event_id: EventId::new(),
            ticket_type_id: TicketTypeId::new(),
            session_id: session,
            requested,
            available,
        }
    }

    #[test]
    fn partial_fulfill_grants_what_is_left() {
        let session = SessionId::new("s2");
        let conflict = resolve(ConflictPolicy::PartialFulfill, &request(&session, 7, 6), Utc::now());

        assert_eq!(conflict.resolution_type, ResolutionType::PartialFulfill);
        assert_eq!(conflict.resolved_quantity, 6);
        assert_eq!(conflict.shortfall(), 1);
        assert_eq!(
            conflict.message,
            "Only 6 tickets available. Partial fulfillment offered."
        );
    }

    #[test]
    fn partial_fulfill_with_nothing_left_is_a_denial() {
        let session = SessionId::new("s2");
        let conflict = resolve(ConflictPolicy::PartialFulfill, &request(&session, 2, 0), Utc::now());

        assert_eq!(conflict.resolution_type, ResolutionType::DenyRequest);
        assert_eq!(conflict.resolved_quantity, 0);
        assert_eq!(conflict.message, "Requested quantity not available");
    }

    #[test]
    fn deny_grants_nothing() {
        let session = SessionId::new("s2");
        let conflict = resolve(ConflictPolicy::DenyRequest, &request(&session, 7, 6), Utc::now());

        assert_eq!(conflict.resolution_type, ResolutionType::DenyRequest);
        assert_eq!(conflict.resolved_quantity, 0);
        assert_eq!(conflict.shortfall(), 7);
    }

    #[test]
    fn queue_records_request() {
        let session = SessionId::new("s2");
        let conflict = resolve(ConflictPolicy::QueueRequest, &request(&session, 7, 6), Utc::now());

        assert_eq!(conflict.resolution_type, ResolutionType::QueueRequest);
        assert_eq!(conflict.resolved_quantity, 0);
        assert_eq!(conflict.requested_quantity, 7);
        assert_eq!(conflict.available_quantity, 6);
    }

    #[test]
    fn policy_parses_from_config_values() {
        assert_eq!(
            "deny-request".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::DenyRequest
        );
        assert_eq!(
            "QUEUE_REQUEST".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::QueueRequest
        );
        assert!("first-come".parse::<ConflictPolicy>().is_err());
    }
}

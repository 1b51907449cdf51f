//! Domain types for the inventory hold service.
//!
//! Identifiers, inventory records, holds, ledger entries, conflict records,
//! availability statuses and alerts. Everything here is plain data; the rules
//! that mutate it live in the inventory reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of an event (the show, not a domain event)
    EventId
);
uuid_id!(
    /// Identifier of a ticket type within an event
    TicketTypeId
);
uuid_id!(
    /// Identifier of a hold
    HoldId
);
uuid_id!(
    /// Identifier of a ledger entry
    TransactionId
);
uuid_id!(
    /// Identifier of a conflict resolution record
    ConflictId
);
uuid_id!(
    /// Identifier of an inventory alert
    AlertId
);
uuid_id!(
    /// Identifier of a bulk operation
    BulkOperationId
);
uuid_id!(
    /// Correlates a command with the outcome the reducer emits for it
    RequestId
);

/// Checkout session owning a set of holds.
///
/// Sessions are chosen by the client; when a hold request carries none the
/// service generates one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a client-provided session id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh session id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Inventory records
// ============================================================================

/// Counters for one ticket type of one event.
///
/// `available` is always derived, never stored, so it cannot drift from
/// `total - sold - held`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Event the ticket type belongs to
    pub event_id: EventId,
    /// Ticket type
    pub ticket_type_id: TicketTypeId,
    /// Display name of the ticket type
    pub name: String,
    /// Total quantity ever offered
    pub total: u32,
    /// Units sold
    pub sold: u32,
    /// Units currently held by active holds
    pub held: u32,
    /// Last time any counter changed
    pub last_updated: DateTime<Utc>,
}

impl InventoryRecord {
    /// Create an empty record with `total` units available
    #[must_use]
    pub fn new(
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        name: impl Into<String>,
        total: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            ticket_type_id,
            name: name.into(),
            total,
            sold: 0,
            held: 0,
            last_updated: now,
        }
    }

    /// Units neither sold nor held
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.total.saturating_sub(self.sold).saturating_sub(self.held)
    }

    /// Whether `sold + held <= total` holds
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        (self.sold as u64) + (self.held as u64) <= self.total as u64
    }
}

/// Read model of an inventory record, with `available` materialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryView {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Ticket type name
    pub name: String,
    /// Total quantity
    pub total: u32,
    /// Sold quantity
    pub sold: u32,
    /// Held quantity (active, unexpired holds only)
    pub held: u32,
    /// Available quantity
    pub available: u32,
    /// Last counter change
    pub last_updated: DateTime<Utc>,
}

impl From<&InventoryRecord> for InventoryView {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            event_id: record.event_id,
            ticket_type_id: record.ticket_type_id,
            name: record.name.clone(),
            total: record.total,
            sold: record.sold,
            held: record.held,
            available: record.available(),
            last_updated: record.last_updated,
        }
    }
}

/// Inventory of a whole event as of a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInventoryStatus {
    /// Event id
    pub event_id: EventId,
    /// Sum of totals across ticket types
    pub total: u32,
    /// Sum of sold quantities
    pub sold: u32,
    /// Sum of held quantities
    pub held: u32,
    /// Sum of available quantities
    pub available: u32,
    /// Per ticket type breakdown
    pub ticket_types: Vec<InventoryView>,
    /// Holds that are active and unexpired at `as_of`
    pub active_holds: Vec<Hold>,
    /// Instant the status was computed for
    pub as_of: DateTime<Utc>,
}

// ============================================================================
// Holds
// ============================================================================

/// Category of a hold. Each category has its own default duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoldType {
    /// Online checkout in progress
    #[default]
    Checkout,
    /// Waiting for cash payment at the door or an outlet
    CashPayment,
    /// Operator reservation
    AdminReserve,
}

impl HoldType {
    /// Wire name of the category
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::CashPayment => "cash-payment",
            Self::AdminReserve => "admin-reserve",
        }
    }
}

impl fmt::Display for HoldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a hold. `Expired` and `Released` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoldStatus {
    /// Counted against the record's held quantity
    Active,
    /// Timed out
    Expired,
    /// Explicitly released, or converted into a sale
    Released,
}

impl HoldStatus {
    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Released)
    }

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-boxed reservation of units of one ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Hold id
    pub id: HoldId,
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Units held
    pub quantity: u32,
    /// Owning session
    pub session_id: SessionId,
    /// Category
    pub hold_type: HoldType,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time; `None` only for open-ended operator reservations
    pub expires_at: Option<DateTime<Utc>>,
    /// Stored status
    pub status: HoldStatus,
    /// When the hold was released
    pub released_at: Option<DateTime<Utc>>,
    /// Why the hold left the active state
    pub release_reason: Option<String>,
}

impl Hold {
    /// Stored as active but past its expiry time.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && self.expires_at.is_some_and(|at| now >= at)
    }

    /// Active and not yet expired at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && !self.is_overdue(now)
    }

    /// Status as observed at `now`, applying the lazy expiry check.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> HoldStatus {
        if self.is_overdue(now) {
            HoldStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy of the hold with its status as observed at `now`.
    #[must_use]
    pub fn observed_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: self.status_at(now),
            ..self.clone()
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Kind of inventory mutation recorded in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Units sold, directly or by converting a hold
    Purchase,
    /// Sold units returned
    Refund,
    /// Operator change to the total
    AdminAdjustment,
    /// Units moved from available to held
    HoldCreate,
    /// Held units returned, by an explicit release or by expiry
    HoldRelease,
}

impl TransactionType {
    /// Wire name of the transaction type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Refund => "refund",
            Self::AdminAdjustment => "admin-adjustment",
            Self::HoldCreate => "hold-create",
            Self::HoldRelease => "hold-release",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit entry. Appended with every counter change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    /// Entry id
    pub id: TransactionId,
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Kind of mutation
    pub transaction_type: TransactionType,
    /// Change to the available quantity (negative when units leave availability)
    pub quantity: i64,
    /// Available quantity before the mutation
    pub available_before: u32,
    /// Available quantity after the mutation
    pub available_after: u32,
    /// Who performed the mutation
    pub actor_id: Option<String>,
    /// Session the mutation belongs to
    pub session_id: Option<SessionId>,
    /// Order the mutation belongs to
    pub order_id: Option<String>,
    /// Free-text reason
    pub reason: String,
    /// When the mutation happened
    pub timestamp: DateTime<Utc>,
    /// Extra string attributes such as `hold_id`
    pub metadata: BTreeMap<String, String>,
}

/// Filter for ledger queries. Empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Restrict to an event
    pub event_id: Option<EventId>,
    /// Restrict to a ticket type
    pub ticket_type_id: Option<TicketTypeId>,
}

impl TransactionFilter {
    /// Whether `transaction` passes the filter
    #[must_use]
    pub fn matches(&self, transaction: &InventoryTransaction) -> bool {
        self.event_id.is_none_or(|id| id == transaction.event_id)
            && self
                .ticket_type_id
                .is_none_or(|id| id == transaction.ticket_type_id)
    }
}

// ============================================================================
// Conflicts
// ============================================================================

/// How a quantity conflict was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionType {
    /// Granted whatever was left
    PartialFulfill,
    /// Granted nothing
    DenyRequest,
    /// Recorded for later, granted nothing now
    QueueRequest,
}

impl ResolutionType {
    /// Wire name, also used as a metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PartialFulfill => "partial-fulfill",
            Self::DenyRequest => "deny-request",
            Self::QueueRequest => "queue-request",
        }
    }
}

/// Record of a request that asked for more than was available.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Conflict id
    pub id: ConflictId,
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Requesting session
    pub session_id: SessionId,
    /// Quantity asked for
    pub requested_quantity: u32,
    /// Quantity available when the request was evaluated
    pub available_quantity: u32,
    /// Outcome
    pub resolution_type: ResolutionType,
    /// Quantity actually granted
    pub resolved_quantity: u32,
    /// Human-readable explanation
    pub message: String,
    /// When the conflict was resolved
    pub timestamp: DateTime<Utc>,
}

impl ConflictResolution {
    /// Units asked for but not granted
    #[must_use]
    pub const fn shortfall(&self) -> u32 {
        self.requested_quantity.saturating_sub(self.resolved_quantity)
    }
}

// ============================================================================
// Availability & alerts
// ============================================================================

/// Stock level classification shown to buyers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityLevel {
    /// Plenty left
    Available,
    /// At or below the low stock threshold
    LowStock,
    /// At or below the critical stock threshold
    CriticalStock,
    /// Nothing left
    SoldOut,
    /// Ticket type not on sale yet
    ComingSoon,
}

/// Availability of one ticket type with its buyer-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityStatus {
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Classification
    pub level: AvailabilityLevel,
    /// Available quantity
    pub available: u32,
    /// Total quantity
    pub total: u32,
    /// Message such as "Only 3 left!"
    pub message: String,
}

/// Kind of inventory alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Record reached zero available
    SoldOut,
    /// Record dropped to the low stock threshold
    LowStock,
}

/// Alert severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Needs attention
    Warning,
}

/// Alert raised when a mutation moves a record into a low stock level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAlert {
    /// Alert id
    pub id: AlertId,
    /// Kind
    pub kind: AlertKind,
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Operator-facing message
    pub message: String,
    /// Severity
    pub severity: AlertSeverity,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
    /// Whether an operator has seen it
    pub acknowledged: bool,
}

// ============================================================================
// Command outcomes
// ============================================================================

/// Result of an inventory mutation, as returned to callers.
///
/// `success == false` is a business outcome (for example a denied conflict),
/// not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    /// Whether the request was carried out
    pub success: bool,
    /// Record after the mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_inventory: Option<InventoryView>,
    /// Conflict record when the request exceeded availability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictResolution>,
    /// Hold created or changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold: Option<Hold>,
    /// Ledger entry written for the mutation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<InventoryTransaction>,
    /// Holds touched by multi-hold operations (sweeps, session release)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_holds: Vec<Hold>,
    /// Human-readable summary
    pub message: String,
}

impl InventoryUpdate {
    /// Successful outcome with a message
    #[must_use]
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Unsuccessful outcome with a message
    #[must_use]
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hold(expires_in: Option<i64>, now: DateTime<Utc>) -> Hold {
        Hold {
            id: HoldId::new(),
            event_id: EventId::new(),
            ticket_type_id: TicketTypeId::new(),
            quantity: 2,
            session_id: SessionId::new("s1"),
            hold_type: HoldType::Checkout,
            created_at: now,
            expires_at: expires_in.map(|m| now + Duration::minutes(m)),
            status: HoldStatus::Active,
            released_at: None,
            release_reason: None,
        }
    }

    #[test]
    fn available_is_derived() {
        let mut record =
            InventoryRecord::new(EventId::new(), TicketTypeId::new(), "GA", 10, Utc::now());
        record.sold = 3;
        record.held = 4;
        assert_eq!(record.available(), 3);
        assert!(record.is_consistent());

        record.held = 8;
        assert_eq!(record.available(), 0);
        assert!(!record.is_consistent());
    }

    #[test]
    fn hold_expires_exactly_at_expiry_time() {
        let now = Utc::now();
        let hold = hold(Some(5), now);

        assert!(hold.is_active_at(now + Duration::minutes(5) - Duration::milliseconds(1)));
        assert_eq!(hold.status_at(now + Duration::minutes(5)), HoldStatus::Expired);
        assert!(hold.is_overdue(now + Duration::minutes(6)));
    }

    #[test]
    fn open_ended_hold_never_expires() {
        let now = Utc::now();
        let hold = hold(None, now);
        assert!(hold.is_active_at(now + Duration::days(365)));
    }

    #[test]
    fn released_hold_is_not_overdue() {
        let now = Utc::now();
        let mut hold = hold(Some(1), now);
        hold.status = HoldStatus::Released;
        assert!(!hold.is_overdue(now + Duration::minutes(2)));
        assert_eq!(hold.status_at(now + Duration::minutes(2)), HoldStatus::Released);
    }

    #[test]
    fn wire_names_are_kebab_case() {
        let json = serde_json::to_string(&HoldType::CashPayment).unwrap();
        assert_eq!(json, "\"cash-payment\"");
        let json = serde_json::to_string(&TransactionType::AdminAdjustment).unwrap();
        assert_eq!(json, "\"admin-adjustment\"");
        assert_eq!(ResolutionType::QueueRequest.as_str(), "queue-request");
    }

    #[test]
    fn session_ids_are_generated_with_prefix() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("session_"));
        assert_ne!(id, SessionId::generate());
    }
}

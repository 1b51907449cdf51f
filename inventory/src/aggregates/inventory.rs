//! Inventory aggregate.
//!
//! Owns every inventory record, hold, ledger entry, conflict record and
//! alert. All counter changes happen inside [`InventoryReducer::reduce`],
//! which the store runs under its write lock: checking availability and
//! taking stock is a single step, so concurrent hold requests can never both
//! see the same units as free.
//!
//! Commands carry a [`RequestId`]. The reducer answers each command with a
//! `CommandApplied` or `CommandRejected` event produced by an effect, which
//! callers wait for with `Store::send_and_wait_for`. New ledger entries are
//! forwarded to the configured [`TransactionSink`] by a second effect.

use crate::availability::{self, StockThresholds};
use crate::config::InventoryConfig;
use crate::conflict::{self, ConflictRequest};
use crate::error::InventoryError;
use crate::ledger::TransactionSink;
use crate::metrics;
use crate::types::{
    AlertId, AvailabilityStatus, ConflictResolution, EventId, EventInventoryStatus, Hold, HoldId,
    HoldStatus, HoldType, InventoryAlert, InventoryRecord, InventoryTransaction, InventoryUpdate,
    InventoryView, RequestId, SessionId, TicketTypeId, TransactionFilter, TransactionId,
    TransactionType,
};
use boxoffice_core::{
    SmallVec, async_effect, effect::Effect, environment::Clock, reducer::Reducer,
};
use boxoffice_macros::Action;
use boxoffice_runtime::{DeadLetterQueue, RetryPolicy, retry_or_dead_letter};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Release reason recorded by sweeps.
pub const EXPIRY_REASON: &str = "Automatic cleanup - hold expired";

/// Release reason when none is given.
pub const DEFAULT_RELEASE_REASON: &str = "Hold released";

/// Release reason for holds turned into sales.
pub const CONVERSION_REASON: &str = "Converted to sale";

// ============================================================================
// State
// ============================================================================

/// Complete inventory state.
#[derive(Clone, Debug, Default)]
pub struct InventoryState {
    /// Records by ticket type
    pub records: HashMap<TicketTypeId, InventoryRecord>,
    /// Every hold ever created, terminal ones included
    pub holds: HashMap<HoldId, Hold>,
    /// Append-only ledger, oldest first
    pub transactions: Vec<InventoryTransaction>,
    /// Conflict records, oldest first
    pub conflicts: Vec<ConflictResolution>,
    /// Alerts, oldest first
    pub alerts: Vec<InventoryAlert>,
    /// Last rejected command, for diagnostics
    pub last_error: Option<InventoryError>,
}

/// Which overdue holds a sweep looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExpiryScope {
    All,
    Event(EventId),
    TicketType(TicketTypeId),
}

impl ExpiryScope {
    fn contains(self, hold: &Hold) -> bool {
        match self {
            Self::All => true,
            Self::Event(id) => hold.event_id == id,
            Self::TicketType(id) => hold.ticket_type_id == id,
        }
    }
}

impl InventoryState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a ticket type of an event
    #[must_use]
    pub fn record(&self, event_id: EventId, ticket_type_id: TicketTypeId) -> Option<&InventoryRecord> {
        self.records
            .get(&ticket_type_id)
            .filter(|record| record.event_id == event_id)
    }

    /// Quantity still counted as held by holds that are overdue at `now`
    #[must_use]
    pub fn overdue_quantity(&self, ticket_type_id: TicketTypeId, now: DateTime<Utc>) -> u32 {
        self.holds
            .values()
            .filter(|hold| hold.ticket_type_id == ticket_type_id && hold.is_overdue(now))
            .map(|hold| hold.quantity)
            .sum()
    }

    /// Record as observed at `now`: overdue holds no longer count as held.
    #[must_use]
    pub fn view_at(&self, record: &InventoryRecord, now: DateTime<Utc>) -> InventoryView {
        let overdue = self.overdue_quantity(record.ticket_type_id, now);
        let mut view = InventoryView::from(record);
        view.held = record.held.saturating_sub(overdue);
        view.available = record
            .total
            .saturating_sub(record.sold)
            .saturating_sub(view.held);
        view
    }

    /// Inventory of an event at `now`, `None` when it has no ticket types
    #[must_use]
    pub fn event_status(&self, event_id: EventId, now: DateTime<Utc>) -> Option<EventInventoryStatus> {
        let mut ticket_types: Vec<InventoryView> = self
            .records
            .values()
            .filter(|record| record.event_id == event_id)
            .map(|record| self.view_at(record, now))
            .collect();
        if ticket_types.is_empty() {
            return None;
        }
        ticket_types.sort_by(|a, b| a.name.cmp(&b.name).then(a.ticket_type_id.cmp(&b.ticket_type_id)));

        let mut active_holds: Vec<Hold> = self
            .holds
            .values()
            .filter(|hold| hold.event_id == event_id && hold.is_active_at(now))
            .cloned()
            .collect();
        active_holds.sort_by_key(|hold| (hold.created_at, hold.id));

        Some(EventInventoryStatus {
            event_id,
            total: ticket_types.iter().map(|t| t.total).sum(),
            sold: ticket_types.iter().map(|t| t.sold).sum(),
            held: ticket_types.iter().map(|t| t.held).sum(),
            available: ticket_types.iter().map(|t| t.available).sum(),
            ticket_types,
            active_holds,
            as_of: now,
        })
    }

    /// Availability classification of a ticket type at `now`
    #[must_use]
    pub fn availability(
        &self,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> AvailabilityStatus {
        match self.record(event_id, ticket_type_id) {
            Some(record) => {
                let view = self.view_at(record, now);
                availability::classify(ticket_type_id, view.available, view.total, thresholds)
            },
            None => availability::coming_soon(ticket_type_id),
        }
    }

    /// Hold with its status as observed at `now`
    #[must_use]
    pub fn hold_at(&self, hold_id: HoldId, now: DateTime<Utc>) -> Option<Hold> {
        self.holds.get(&hold_id).map(|hold| hold.observed_at(now))
    }

    /// Holds of a session that are active at `now`
    #[must_use]
    pub fn session_holds(&self, session_id: &SessionId, now: DateTime<Utc>) -> Vec<Hold> {
        let mut holds: Vec<Hold> = self
            .holds
            .values()
            .filter(|hold| &hold.session_id == session_id && hold.is_active_at(now))
            .cloned()
            .collect();
        holds.sort_by_key(|hold| (hold.created_at, hold.id));
        holds
    }

    /// Ledger entries matching `filter`, newest first
    #[must_use]
    pub fn transactions(&self, filter: &TransactionFilter) -> Vec<InventoryTransaction> {
        self.transactions
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Alerts, optionally for one event, newest first
    #[must_use]
    pub fn alerts(&self, event_id: Option<EventId>) -> Vec<InventoryAlert> {
        self.alerts
            .iter()
            .rev()
            .filter(|alert| event_id.is_none_or(|id| alert.event_id == id))
            .cloned()
            .collect()
    }

    /// Whether every record satisfies `sold + held <= total` and its held
    /// quantity equals the sum of its active holds.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.records.values().all(|record| {
            let held: u32 = self
                .holds
                .values()
                .filter(|hold| {
                    hold.ticket_type_id == record.ticket_type_id && hold.status == HoldStatus::Active
                })
                .map(|hold| hold.quantity)
                .sum();
            record.is_consistent() && held == record.held
        })
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the inventory aggregate.
#[derive(Action, Clone, Debug)]
pub enum InventoryAction {
    // Commands
    /// Put a ticket type on sale
    #[command]
    RegisterTicketType {
        /// Correlation id
        request_id: RequestId,
        /// Event id
        event_id: EventId,
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Display name
        name: String,
        /// Quantity on sale
        total: u32,
        /// Who registered it
        actor: Option<String>,
    },

    /// Reserve units for a session
    #[command]
    CreateHold {
        /// Correlation id
        request_id: RequestId,
        /// Event id
        event_id: EventId,
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Units requested
        quantity: u32,
        /// Owning session; generated when absent
        session_id: Option<SessionId>,
        /// Category
        hold_type: HoldType,
        /// Lifetime in minutes; category default when absent
        duration_minutes: Option<u32>,
        /// Who asked
        actor: Option<String>,
    },

    /// Release a hold. Unknown or finished holds are a no-op.
    #[command]
    ReleaseHold {
        /// Correlation id
        request_id: RequestId,
        /// Hold id
        hold_id: HoldId,
        /// Why
        reason: Option<String>,
        /// Who asked
        actor: Option<String>,
    },

    /// Push an active hold's expiry forward
    #[command]
    ExtendHold {
        /// Correlation id
        request_id: RequestId,
        /// Hold id
        hold_id: HoldId,
        /// Minutes to add
        additional_minutes: u32,
        /// Who asked
        actor: Option<String>,
    },

    /// Change the quantity of an active hold
    #[command]
    UpdateHold {
        /// Correlation id
        request_id: RequestId,
        /// Hold id
        hold_id: HoldId,
        /// New quantity
        quantity: u32,
        /// Who asked
        actor: Option<String>,
    },

    /// Release every active hold of a session
    #[command]
    ReleaseSessionHolds {
        /// Correlation id
        request_id: RequestId,
        /// Session id
        session_id: SessionId,
        /// Why
        reason: Option<String>,
        /// Who asked
        actor: Option<String>,
    },

    /// Sell units, converting the session's hold when there is one
    #[command]
    Purchase {
        /// Correlation id
        request_id: RequestId,
        /// Event id
        event_id: EventId,
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Units bought
        quantity: u32,
        /// Session whose hold is converted
        session_id: Option<SessionId>,
        /// Order reference
        order_id: Option<String>,
        /// Who bought
        actor: Option<String>,
    },

    /// Return sold units to availability
    #[command]
    Refund {
        /// Correlation id
        request_id: RequestId,
        /// Event id
        event_id: EventId,
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Units refunded
        quantity: u32,
        /// Order reference
        order_id: Option<String>,
        /// Why
        reason: Option<String>,
        /// Who refunded
        actor: Option<String>,
    },

    /// Change a ticket type's total
    #[command]
    AdjustInventory {
        /// Correlation id
        request_id: RequestId,
        /// Event id
        event_id: EventId,
        /// Ticket type id
        ticket_type_id: TicketTypeId,
        /// Signed change to the total
        delta: i64,
        /// Why
        reason: String,
        /// Who adjusted
        actor: Option<String>,
    },

    /// Expire overdue holds, everywhere or for one event
    #[command]
    SweepExpired {
        /// Correlation id
        request_id: RequestId,
        /// Restrict to one event
        event_id: Option<EventId>,
    },

    /// Mark an alert as seen
    #[command]
    AcknowledgeAlert {
        /// Correlation id
        request_id: RequestId,
        /// Alert id
        alert_id: AlertId,
    },

    // Events
    /// A command was carried out (possibly as a declined conflict)
    #[event]
    CommandApplied {
        /// Correlation id of the command
        request_id: RequestId,
        /// Outcome
        update: Box<InventoryUpdate>,
    },

    /// A command was rejected; state is unchanged apart from lazy expiry
    #[event]
    CommandRejected {
        /// Correlation id of the command
        request_id: RequestId,
        /// Reason
        error: InventoryError,
    },
}

impl InventoryAction {
    /// Correlation id carried by every action
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::RegisterTicketType { request_id, .. }
            | Self::CreateHold { request_id, .. }
            | Self::ReleaseHold { request_id, .. }
            | Self::ExtendHold { request_id, .. }
            | Self::UpdateHold { request_id, .. }
            | Self::ReleaseSessionHolds { request_id, .. }
            | Self::Purchase { request_id, .. }
            | Self::Refund { request_id, .. }
            | Self::AdjustInventory { request_id, .. }
            | Self::SweepExpired { request_id, .. }
            | Self::AcknowledgeAlert { request_id, .. }
            | Self::CommandApplied { request_id, .. }
            | Self::CommandRejected { request_id, .. } => *request_id,
        }
    }

    /// Outcome carried by a result event for `request_id`
    #[must_use]
    pub fn outcome_for(&self, request_id: RequestId) -> Option<Result<InventoryUpdate, InventoryError>> {
        match self {
            Self::CommandApplied { request_id: id, update } if *id == request_id => {
                Some(Ok((**update).clone()))
            },
            Self::CommandRejected { request_id: id, error } if *id == request_id => {
                Some(Err(error.clone()))
            },
            _ => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the inventory reducer
#[derive(Clone)]
pub struct InventoryEnvironment {
    /// Clock used for every timestamp and expiry decision
    pub clock: Arc<dyn Clock>,
    /// Durable ledger destination
    pub sink: Arc<dyn TransactionSink>,
    /// Durations, thresholds and conflict policy
    pub config: Arc<InventoryConfig>,
    /// Retry policy for ledger forwarding
    pub retry: RetryPolicy,
    /// Where ledger writes go after retries are exhausted
    pub dlq: DeadLetterQueue<String>,
}

impl InventoryEnvironment {
    /// Creates a new `InventoryEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: Arc<dyn TransactionSink>,
        config: InventoryConfig,
        dlq: DeadLetterQueue<String>,
    ) -> Self {
        Self {
            clock,
            sink,
            config: Arc::new(config),
            retry: RetryPolicy::default(),
            dlq,
        }
    }

    /// Replace the ledger retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the inventory aggregate
#[derive(Clone, Debug, Default)]
pub struct InventoryReducer;

/// Fields shared by every ledger entry written for one command.
struct EntryContext<'a> {
    actor: Option<&'a str>,
    session_id: Option<&'a SessionId>,
    order_id: Option<&'a str>,
    now: DateTime<Utc>,
}

impl InventoryReducer {
    /// Creates a new `InventoryReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // ---------------------------------------------------------------------
    // Invariant and bookkeeping helpers
    // ---------------------------------------------------------------------

    fn violation(record: &InventoryRecord) -> InventoryError {
        metrics::record_invariant_violation();
        tracing::error!(
            event_id = %record.event_id,
            ticket_type_id = %record.ticket_type_id,
            total = record.total,
            sold = record.sold,
            held = record.held,
            "Inventory invariant violated; mutation rejected"
        );
        InventoryError::InvariantViolation {
            ticket_type_id: record.ticket_type_id,
            sold: record.sold,
            held: record.held,
            total: record.total,
        }
    }

    /// Reject a candidate record that breaks `sold + held <= total`.
    fn guard(candidate: &InventoryRecord) -> Result<(), InventoryError> {
        if candidate.is_consistent() {
            Ok(())
        } else {
            Err(Self::violation(candidate))
        }
    }

    /// Take `quantity` out of `record.held`, which must cover it.
    fn return_held(record: &mut InventoryRecord, quantity: u32) -> Result<(), InventoryError> {
        match record.held.checked_sub(quantity) {
            Some(held) => {
                record.held = held;
                Ok(())
            },
            None => Err(Self::violation(record)),
        }
    }

    fn load(
        state: &InventoryState,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
    ) -> Result<InventoryRecord, InventoryError> {
        state
            .record(event_id, ticket_type_id)
            .cloned()
            .ok_or(InventoryError::TicketTypeNotFound(ticket_type_id))
    }

    /// Store a record that passed [`Self::guard`], raising an alert when it
    /// crossed into a low stock level.
    fn commit(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        mut record: InventoryRecord,
        available_before: u32,
        now: DateTime<Utc>,
    ) -> InventoryView {
        record.last_updated = now;
        if let Some(alert) =
            availability::alert_for_transition(&record, available_before, env.config.thresholds(), now)
        {
            tracing::info!(
                ticket_type_id = %record.ticket_type_id,
                kind = ?alert.kind,
                message = %alert.message,
                "Inventory alert raised"
            );
            state.alerts.push(alert);
        }
        let view = state.view_at(&record, now);
        state.records.insert(record.ticket_type_id, record);
        view
    }

    #[allow(clippy::too_many_arguments)]
    fn append_entry(
        state: &mut InventoryState,
        record: &InventoryRecord,
        transaction_type: TransactionType,
        quantity: i64,
        available_before: u32,
        reason: impl Into<String>,
        ctx: &EntryContext<'_>,
        metadata: BTreeMap<String, String>,
    ) -> InventoryTransaction {
        let entry = InventoryTransaction {
            id: TransactionId::new(),
            event_id: record.event_id,
            ticket_type_id: record.ticket_type_id,
            transaction_type,
            quantity,
            available_before,
            available_after: record.available(),
            actor_id: ctx.actor.map(str::to_string),
            session_id: ctx.session_id.cloned(),
            order_id: ctx.order_id.map(str::to_string),
            reason: reason.into(),
            timestamp: ctx.now,
            metadata,
        };
        state.transactions.push(entry.clone());
        entry
    }

    fn hold_metadata(hold: &Hold) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("hold_id".to_string(), hold.id.to_string()),
            ("hold_type".to_string(), hold.hold_type.to_string()),
        ])
    }

    /// Move an active hold to `Released` or `Expired` and give its units back.
    fn end_hold(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        hold_id: HoldId,
        status: HoldStatus,
        reason: &str,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Hold, InventoryTransaction, InventoryView), InventoryError> {
        let mut hold = state
            .holds
            .get(&hold_id)
            .cloned()
            .ok_or(InventoryError::HoldNotFound(hold_id))?;
        let mut record = state
            .records
            .get(&hold.ticket_type_id)
            .cloned()
            .ok_or(InventoryError::TicketTypeNotFound(hold.ticket_type_id))?;

        let before = record.available();
        Self::return_held(&mut record, hold.quantity)?;
        Self::guard(&record)?;

        hold.status = status;
        hold.release_reason = Some(reason.to_string());
        if status == HoldStatus::Released {
            hold.released_at = Some(now);
        }

        let label = if status == HoldStatus::Expired {
            "expired"
        } else {
            "released"
        };
        let mut metadata = Self::hold_metadata(&hold);
        metadata.insert("ended".to_string(), label.to_string());
        let ctx = EntryContext {
            actor,
            session_id: Some(&hold.session_id),
            order_id: None,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::HoldRelease,
            i64::from(hold.quantity),
            before,
            reason,
            &ctx,
            metadata,
        );

        state.holds.insert(hold.id, hold.clone());
        let view = Self::commit(state, env, record, before, now);
        metrics::record_hold(label, hold.quantity);

        Ok((hold, entry, view))
    }

    /// Expire every overdue hold in `scope`, oldest expiry first.
    fn expire_overdue(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        scope: ExpiryScope,
        now: DateTime<Utc>,
    ) -> Vec<Hold> {
        let mut overdue: Vec<(Option<DateTime<Utc>>, HoldId)> = state
            .holds
            .values()
            .filter(|hold| scope.contains(hold) && hold.is_overdue(now))
            .map(|hold| (hold.expires_at, hold.id))
            .collect();
        overdue.sort();

        let mut expired = Vec::with_capacity(overdue.len());
        for (_, hold_id) in overdue {
            match Self::end_hold(state, env, hold_id, HoldStatus::Expired, EXPIRY_REASON, None, now) {
                Ok((hold, _, _)) => expired.push(hold),
                Err(error) => {
                    tracing::error!(hold_id = %hold_id, error = %error, "Failed to expire hold");
                },
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue holds");
        }
        expired
    }

    // ---------------------------------------------------------------------
    // Command handlers
    // ---------------------------------------------------------------------

    fn register_ticket_type(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        name: String,
        total: u32,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if name.trim().is_empty() {
            return Err(InventoryError::validation("Ticket type name must not be empty"));
        }
        if total == 0 {
            return Err(InventoryError::validation("Total quantity must be greater than zero"));
        }
        if state.records.contains_key(&ticket_type_id) {
            return Err(InventoryError::validation(format!(
                "Ticket type {ticket_type_id} is already registered"
            )));
        }

        let record = InventoryRecord::new(event_id, ticket_type_id, name, total, now);
        let ctx = EntryContext {
            actor,
            session_id: None,
            order_id: None,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::AdminAdjustment,
            i64::from(total),
            0,
            "Ticket type registered",
            &ctx,
            BTreeMap::new(),
        );
        let message = format!("Ticket type {} registered with {total} tickets", record.name);
        // Registration never raises a stock alert
        let view = Self::commit(state, env, record, total, now);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(message)
        })
    }

    fn hold_expiry(
        config: &InventoryConfig,
        hold_type: HoldType,
        duration_minutes: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, InventoryError> {
        match duration_minutes.unwrap_or_else(|| config.default_hold_minutes(hold_type)) {
            0 if hold_type == HoldType::AdminReserve => Ok(None),
            0 => Err(InventoryError::validation(
                "Hold duration must be greater than zero",
            )),
            minutes => Ok(Some(now + Duration::minutes(i64::from(minutes)))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_hold(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        session_id: Option<SessionId>,
        hold_type: HoldType,
        duration_minutes: Option<u32>,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if quantity == 0 {
            return Err(InventoryError::validation("Quantity must be greater than zero"));
        }
        if quantity > env.config.max_quantity_per_hold {
            return Err(InventoryError::validation(format!(
                "Quantity {quantity} exceeds the per-hold limit of {}",
                env.config.max_quantity_per_hold
            )));
        }
        Self::load(state, event_id, ticket_type_id)?;
        let expires_at = Self::hold_expiry(&env.config, hold_type, duration_minutes, now)?;
        let session_id = session_id.unwrap_or_else(SessionId::generate);

        Self::expire_overdue(state, env, ExpiryScope::TicketType(ticket_type_id), now);

        let mut record = Self::load(state, event_id, ticket_type_id)?;
        let before = record.available();

        let (granted, conflict) = if quantity <= before {
            (quantity, None)
        } else {
            let resolution = conflict::resolve(
                env.config.conflict_policy,
                &ConflictRequest {
                    event_id,
                    ticket_type_id,
                    session_id: &session_id,
                    requested: quantity,
                    available: before,
                },
                now,
            );
            metrics::record_conflict(resolution.resolution_type);
            tracing::info!(
                ticket_type_id = %ticket_type_id,
                requested = quantity,
                available = before,
                resolution = resolution.resolution_type.as_str(),
                granted = resolution.resolved_quantity,
                "Hold request exceeded availability"
            );
            state.conflicts.push(resolution.clone());

            if resolution.resolved_quantity == 0 {
                return Ok(InventoryUpdate {
                    updated_inventory: Some(state.view_at(&record, now)),
                    message: resolution.message.clone(),
                    conflict: Some(resolution),
                    ..InventoryUpdate::declined("")
                });
            }
            (resolution.resolved_quantity, Some(resolution))
        };

        record.held = record.held.saturating_add(granted);
        Self::guard(&record)?;

        let hold = Hold {
            id: HoldId::new(),
            event_id,
            ticket_type_id,
            quantity: granted,
            session_id,
            hold_type,
            created_at: now,
            expires_at,
            status: HoldStatus::Active,
            released_at: None,
            release_reason: None,
        };
        let ctx = EntryContext {
            actor,
            session_id: Some(&hold.session_id),
            order_id: None,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::HoldCreate,
            -i64::from(granted),
            before,
            format!("Hold created for {hold_type}"),
            &ctx,
            Self::hold_metadata(&hold),
        );
        state.holds.insert(hold.id, hold.clone());
        let view = Self::commit(state, env, record, before, now);
        metrics::record_hold("created", granted);

        tracing::debug!(
            hold_id = %hold.id,
            ticket_type_id = %ticket_type_id,
            quantity = granted,
            session_id = %hold.session_id,
            "Hold created"
        );

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            conflict,
            hold: Some(hold),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(format!("Hold created for {granted} tickets"))
        })
    }

    fn release_hold(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        hold_id: HoldId,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        let Some(existing) = state.holds.get(&hold_id) else {
            return Ok(InventoryUpdate::succeeded("Hold not found or already released"));
        };

        if existing.status.is_terminal() {
            return Ok(InventoryUpdate {
                hold: Some(existing.clone()),
                ..InventoryUpdate::succeeded("Hold not found or already released")
            });
        }

        if existing.is_overdue(now) {
            let (hold, entry, view) =
                Self::end_hold(state, env, hold_id, HoldStatus::Expired, EXPIRY_REASON, None, now)?;
            return Ok(InventoryUpdate {
                updated_inventory: Some(view),
                hold: Some(hold),
                transaction: Some(entry),
                ..InventoryUpdate::succeeded("Hold already expired")
            });
        }

        let (hold, entry, view) = Self::end_hold(
            state,
            env,
            hold_id,
            HoldStatus::Released,
            reason.unwrap_or(DEFAULT_RELEASE_REASON),
            actor,
            now,
        )?;
        let message = format!("Hold released for {} tickets", hold.quantity);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            hold: Some(hold),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(message)
        })
    }

    fn active_hold(
        state: &InventoryState,
        hold_id: HoldId,
        now: DateTime<Utc>,
    ) -> Result<Hold, InventoryError> {
        let hold = state
            .holds
            .get(&hold_id)
            .ok_or(InventoryError::HoldNotFound(hold_id))?;
        match hold.status_at(now) {
            HoldStatus::Active => Ok(hold.clone()),
            status => Err(InventoryError::HoldNotActive { hold_id, status }),
        }
    }

    fn extend_hold(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        hold_id: HoldId,
        additional_minutes: u32,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if additional_minutes == 0 {
            return Err(InventoryError::validation(
                "Extension must be at least one minute",
            ));
        }
        let mut hold = Self::active_hold(state, hold_id, now)?;
        let Some(expires_at) = hold.expires_at else {
            return Err(InventoryError::validation("Hold has no expiry to extend"));
        };

        let new_expiry = expires_at + Duration::minutes(i64::from(additional_minutes));
        hold.expires_at = Some(new_expiry);
        state.holds.insert(hold_id, hold.clone());

        tracing::debug!(hold_id = %hold_id, expires_at = %new_expiry, "Hold extended");

        Ok(InventoryUpdate {
            hold: Some(hold),
            ..InventoryUpdate::succeeded(format!("Hold extended until {}", new_expiry.to_rfc3339()))
        })
    }

    fn update_hold(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        hold_id: HoldId,
        quantity: u32,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if quantity == 0 {
            return Err(InventoryError::validation(
                "Quantity must be greater than zero; release the hold instead",
            ));
        }
        if quantity > env.config.max_quantity_per_hold {
            return Err(InventoryError::validation(format!(
                "Quantity {quantity} exceeds the per-hold limit of {}",
                env.config.max_quantity_per_hold
            )));
        }
        if let Some(hold) = state.holds.get(&hold_id) {
            let ticket_type_id = hold.ticket_type_id;
            Self::expire_overdue(state, env, ExpiryScope::TicketType(ticket_type_id), now);
        }

        let mut hold = Self::active_hold(state, hold_id, now)?;
        let mut record = Self::load(state, hold.event_id, hold.ticket_type_id)?;
        let before = record.available();
        let old = hold.quantity;

        let (transaction_type, delta) = match quantity.cmp(&old) {
            std::cmp::Ordering::Equal => {
                return Ok(InventoryUpdate {
                    updated_inventory: Some(state.view_at(&record, now)),
                    hold: Some(hold),
                    ..InventoryUpdate::succeeded("Hold quantity unchanged")
                });
            },
            std::cmp::Ordering::Greater => {
                let increase = quantity - old;
                if increase > before {
                    return Err(InventoryError::InsufficientInventory {
                        requested: increase,
                        available: before,
                    });
                }
                record.held = record.held.saturating_add(increase);
                (TransactionType::HoldCreate, -i64::from(increase))
            },
            std::cmp::Ordering::Less => {
                Self::return_held(&mut record, old - quantity)?;
                (TransactionType::HoldRelease, i64::from(old - quantity))
            },
        };
        Self::guard(&record)?;

        hold.quantity = quantity;
        let ctx = EntryContext {
            actor,
            session_id: Some(&hold.session_id),
            order_id: None,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            transaction_type,
            delta,
            before,
            format!("Hold quantity changed from {old} to {quantity}"),
            &ctx,
            Self::hold_metadata(&hold),
        );
        state.holds.insert(hold_id, hold.clone());
        let view = Self::commit(state, env, record, before, now);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            hold: Some(hold),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(format!("Hold updated to {quantity} tickets"))
        })
    }

    fn release_session_holds(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        session_id: &SessionId,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> InventoryUpdate {
        let now = env.clock.now();
        let mut ids: Vec<(DateTime<Utc>, HoldId)> = state
            .holds
            .values()
            .filter(|hold| &hold.session_id == session_id && hold.status == HoldStatus::Active)
            .map(|hold| (hold.created_at, hold.id))
            .collect();
        ids.sort();

        let mut affected = Vec::with_capacity(ids.len());
        let mut released = 0usize;
        for (_, hold_id) in ids {
            let overdue = state.holds.get(&hold_id).is_some_and(|hold| hold.is_overdue(now));
            let result = if overdue {
                Self::end_hold(state, env, hold_id, HoldStatus::Expired, EXPIRY_REASON, None, now)
            } else {
                released += 1;
                Self::end_hold(
                    state,
                    env,
                    hold_id,
                    HoldStatus::Released,
                    reason.unwrap_or(DEFAULT_RELEASE_REASON),
                    actor,
                    now,
                )
            };
            match result {
                Ok((hold, _, _)) => affected.push(hold),
                Err(error) => {
                    tracing::error!(hold_id = %hold_id, error = %error, "Failed to release session hold");
                },
            }
        }

        InventoryUpdate {
            affected_holds: affected,
            ..InventoryUpdate::succeeded(format!("Released {released} holds for session {session_id}"))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn purchase(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        session_id: Option<&SessionId>,
        order_id: Option<&str>,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if quantity == 0 {
            return Err(InventoryError::validation("Quantity must be greater than zero"));
        }
        Self::load(state, event_id, ticket_type_id)?;
        Self::expire_overdue(state, env, ExpiryScope::TicketType(ticket_type_id), now);

        let mut record = Self::load(state, event_id, ticket_type_id)?;
        let before = record.available();

        let session_holds: Vec<&Hold> = session_id
            .map(|session| {
                let mut holds: Vec<&Hold> = state
                    .holds
                    .values()
                    .filter(|hold| {
                        &hold.session_id == session
                            && hold.ticket_type_id == ticket_type_id
                            && hold.is_active_at(now)
                    })
                    .collect();
                holds.sort_by_key(|hold| (hold.created_at, hold.id));
                holds
            })
            .unwrap_or_default();

        let converted = if session_holds.is_empty() {
            if quantity > before {
                return Err(InventoryError::InsufficientInventory {
                    requested: quantity,
                    available: before,
                });
            }
            None
        } else {
            let hold = session_holds
                .iter()
                .find(|hold| hold.quantity == quantity)
                .map(|hold| (*hold).clone())
                .ok_or_else(|| {
                    InventoryError::validation("Purchase quantity does not match held quantity")
                })?;
            Self::return_held(&mut record, quantity)?;
            Some(hold)
        };

        record.sold = record.sold.saturating_add(quantity);
        Self::guard(&record)?;

        let mut metadata = BTreeMap::new();
        if let Some(hold) = &converted {
            metadata.insert("converted_hold_id".to_string(), hold.id.to_string());
            let mut hold = hold.clone();
            hold.status = HoldStatus::Released;
            hold.released_at = Some(now);
            hold.release_reason = Some(CONVERSION_REASON.to_string());
            state.holds.insert(hold.id, hold);
            metrics::record_hold("converted", quantity);
        }

        let ctx = EntryContext {
            actor,
            session_id,
            order_id,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::Purchase,
            -i64::from(quantity),
            before,
            "Ticket purchase completed",
            &ctx,
            metadata,
        );
        let view = Self::commit(state, env, record, before, now);
        metrics::record_tickets_sold(quantity);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            hold: converted.and_then(|hold| state.holds.get(&hold.id).cloned()),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(format!("Purchase completed for {quantity} tickets"))
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn refund(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        order_id: Option<&str>,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if quantity == 0 {
            return Err(InventoryError::validation("Quantity must be greater than zero"));
        }
        let mut record = Self::load(state, event_id, ticket_type_id)?;
        if quantity > record.sold {
            return Err(InventoryError::validation(format!(
                "Cannot refund {quantity} tickets; only {} sold",
                record.sold
            )));
        }

        let before = record.available();
        record.sold -= quantity;
        Self::guard(&record)?;

        let ctx = EntryContext {
            actor,
            session_id: None,
            order_id,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::Refund,
            i64::from(quantity),
            before,
            reason.unwrap_or("Refund processed"),
            &ctx,
            BTreeMap::new(),
        );
        let view = Self::commit(state, env, record, before, now);
        metrics::record_tickets_refunded(quantity);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(format!("Refunded {quantity} tickets"))
        })
    }

    fn adjust_inventory(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        delta: i64,
        reason: &str,
        actor: Option<&str>,
    ) -> Result<InventoryUpdate, InventoryError> {
        let now = env.clock.now();
        if delta == 0 {
            return Err(InventoryError::validation("Adjustment must not be zero"));
        }
        if reason.trim().is_empty() {
            return Err(InventoryError::validation("Adjustment reason is required"));
        }
        Self::load(state, event_id, ticket_type_id)?;
        Self::expire_overdue(state, env, ExpiryScope::TicketType(ticket_type_id), now);

        let mut record = Self::load(state, event_id, ticket_type_id)?;
        let committed = u64::from(record.sold) + u64::from(record.held);
        let new_total = i64::from(record.total) + delta;
        let new_total = u32::try_from(new_total).map_err(|_| {
            InventoryError::validation(format!("Total would become {new_total}"))
        })?;
        if u64::from(new_total) < committed {
            return Err(InventoryError::validation(format!(
                "Cannot reduce total to {new_total}: {committed} tickets are sold or held"
            )));
        }

        let before = record.available();
        record.total = new_total;
        Self::guard(&record)?;

        let ctx = EntryContext {
            actor,
            session_id: None,
            order_id: None,
            now,
        };
        let entry = Self::append_entry(
            state,
            &record,
            TransactionType::AdminAdjustment,
            delta,
            before,
            reason,
            &ctx,
            BTreeMap::new(),
        );
        let view = Self::commit(state, env, record, before, now);

        Ok(InventoryUpdate {
            updated_inventory: Some(view),
            transaction: Some(entry),
            ..InventoryUpdate::succeeded(format!("Total adjusted to {new_total}"))
        })
    }

    fn sweep(
        state: &mut InventoryState,
        env: &InventoryEnvironment,
        event_id: Option<EventId>,
    ) -> InventoryUpdate {
        let now = env.clock.now();
        let scope = event_id.map_or(ExpiryScope::All, ExpiryScope::Event);
        let expired = Self::expire_overdue(state, env, scope, now);
        metrics::record_sweep(expired.len());

        InventoryUpdate {
            message: format!("Expired {} holds", expired.len()),
            affected_holds: expired,
            ..InventoryUpdate::succeeded("")
        }
    }

    fn acknowledge_alert(
        state: &mut InventoryState,
        alert_id: AlertId,
    ) -> Result<InventoryUpdate, InventoryError> {
        let alert = state
            .alerts
            .iter_mut()
            .find(|alert| alert.id == alert_id)
            .ok_or(InventoryError::AlertNotFound(alert_id))?;
        alert.acknowledged = true;
        Ok(InventoryUpdate::succeeded(format!("Alert {alert_id} acknowledged")))
    }

    /// Effect forwarding new ledger entries to the sink.
    fn persist(env: &InventoryEnvironment, entries: Vec<InventoryTransaction>) -> Effect<InventoryAction> {
        let sink = Arc::clone(&env.sink);
        let retry = env.retry.clone();
        let dlq = env.dlq.clone();

        async_effect! {
            let ids: Vec<String> = entries.iter().map(|entry| entry.id.to_string()).collect();
            let operation = format!("ledger.append[{}]", ids.join(","));
            match retry_or_dead_letter(&retry, &dlq, &operation, || sink.append(&entries)).await {
                Ok(()) => tracing::debug!(count = entries.len(), "Ledger entries persisted"),
                Err(error) => tracing::error!(
                    count = entries.len(),
                    error = %error,
                    "Ledger entries could not be persisted"
                ),
            }
            None
        }
    }

    /// Effect emitting the outcome of a command.
    fn respond(
        request_id: RequestId,
        result: Result<InventoryUpdate, InventoryError>,
    ) -> Effect<InventoryAction> {
        let action = match result {
            Ok(update) => InventoryAction::CommandApplied {
                request_id,
                update: Box::new(update),
            },
            Err(error) => InventoryAction::CommandRejected { request_id, error },
        };
        async_effect! { Some(action) }
    }
}

impl Reducer for InventoryReducer {
    type State = InventoryState;
    type Action = InventoryAction;
    type Environment = InventoryEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let request_id = action.request_id();
        let ledger_len = state.transactions.len();

        let result = match action {
            InventoryAction::RegisterTicketType {
                event_id,
                ticket_type_id,
                name,
                total,
                actor,
                ..
            } => Self::register_ticket_type(
                state,
                env,
                event_id,
                ticket_type_id,
                name,
                total,
                actor.as_deref(),
            ),
            InventoryAction::CreateHold {
                event_id,
                ticket_type_id,
                quantity,
                session_id,
                hold_type,
                duration_minutes,
                actor,
                ..
            } => Self::create_hold(
                state,
                env,
                event_id,
                ticket_type_id,
                quantity,
                session_id,
                hold_type,
                duration_minutes,
                actor.as_deref(),
            ),
            InventoryAction::ReleaseHold {
                hold_id,
                reason,
                actor,
                ..
            } => Self::release_hold(state, env, hold_id, reason.as_deref(), actor.as_deref()),
            InventoryAction::ExtendHold {
                hold_id,
                additional_minutes,
                ..
            } => Self::extend_hold(state, env, hold_id, additional_minutes),
            InventoryAction::UpdateHold {
                hold_id,
                quantity,
                actor,
                ..
            } => Self::update_hold(state, env, hold_id, quantity, actor.as_deref()),
            InventoryAction::ReleaseSessionHolds {
                session_id,
                reason,
                actor,
                ..
            } => Ok(Self::release_session_holds(
                state,
                env,
                &session_id,
                reason.as_deref(),
                actor.as_deref(),
            )),
            InventoryAction::Purchase {
                event_id,
                ticket_type_id,
                quantity,
                session_id,
                order_id,
                actor,
                ..
            } => Self::purchase(
                state,
                env,
                event_id,
                ticket_type_id,
                quantity,
                session_id.as_ref(),
                order_id.as_deref(),
                actor.as_deref(),
            ),
            InventoryAction::Refund {
                event_id,
                ticket_type_id,
                quantity,
                order_id,
                reason,
                actor,
                ..
            } => Self::refund(
                state,
                env,
                event_id,
                ticket_type_id,
                quantity,
                order_id.as_deref(),
                reason.as_deref(),
                actor.as_deref(),
            ),
            InventoryAction::AdjustInventory {
                event_id,
                ticket_type_id,
                delta,
                reason,
                actor,
                ..
            } => Self::adjust_inventory(
                state,
                env,
                event_id,
                ticket_type_id,
                delta,
                &reason,
                actor.as_deref(),
            ),
            InventoryAction::SweepExpired { event_id, .. } => Ok(Self::sweep(state, env, event_id)),
            InventoryAction::AcknowledgeAlert { alert_id, .. } => {
                Self::acknowledge_alert(state, alert_id)
            },

            // ========== Events ==========
            // Outcomes are for observers; the state change already happened.
            InventoryAction::CommandApplied { .. } | InventoryAction::CommandRejected { .. } => {
                return SmallVec::new();
            },
        };

        match &result {
            Ok(_) => state.last_error = None,
            Err(error) => {
                tracing::debug!(request_id = %request_id, error = %error, "Command rejected");
                state.last_error = Some(error.clone());
            },
        }

        let mut effects: SmallVec<[Effect<InventoryAction>; 4]> = SmallVec::new();
        if state.transactions.len() > ledger_len {
            effects.push(Self::persist(env, state.transactions[ledger_len..].to_vec()));
        }
        effects.push(Self::respond(request_id, result));
        effects
    }
}

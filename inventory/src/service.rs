//! Inventory service.
//!
//! The entry point used by HTTP handlers, the bulk runner and tests. Every
//! call is authorized against the caller's [`SessionContext`], then either
//! dispatched to the store as a command (waiting for its outcome event) or
//! answered from a read-locked snapshot of the state.

use crate::access::{AccessPolicy, Capability, SessionContext};
use crate::aggregates::{InventoryAction, InventoryEnvironment, InventoryReducer, InventoryState};
use crate::config::{AccessConfig, InventoryConfig};
use crate::error::{InventoryError, InventoryResult};
use crate::ledger::TransactionSink;
use crate::types::{
    AlertId, AvailabilityStatus, EventId, EventInventoryStatus, Hold, HoldId, HoldType,
    InventoryAlert, InventoryTransaction, InventoryUpdate, RequestId, SessionId, TicketTypeId,
    TransactionFilter,
};
use boxoffice_core::environment::Clock;
use boxoffice_runtime::{DeadLetterQueue, Store, StoreConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Store type for the inventory aggregate
pub type InventoryStore =
    Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>;

// ============================================================================
// Requests
// ============================================================================

/// Register a ticket type for an event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterTicketTypeRequest {
    /// Id to use; generated when absent
    #[serde(default)]
    pub ticket_type_id: Option<TicketTypeId>,
    /// Display name
    pub name: String,
    /// Quantity on sale
    pub total: u32,
}

/// Create a hold
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateHoldRequest {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Units requested
    pub quantity: u32,
    /// Owning session; defaults to the caller's session
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Category
    #[serde(default)]
    pub hold_type: HoldType,
    /// Lifetime in minutes; category default when absent
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Buy tickets, converting the session's hold when there is one
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Units bought
    pub quantity: u32,
    /// Session whose hold is converted; defaults to the caller's session
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Order reference
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Refund sold tickets
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Units refunded
    pub quantity: u32,
    /// Order reference
    #[serde(default)]
    pub order_id: Option<String>,
    /// Why
    #[serde(default)]
    pub reason: Option<String>,
}

/// Change a ticket type's total
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    /// Event id
    pub event_id: EventId,
    /// Ticket type id
    pub ticket_type_id: TicketTypeId,
    /// Signed change to the total
    pub delta: i64,
    /// Why
    pub reason: String,
}

// ============================================================================
// Service
// ============================================================================

/// Authorized access to the inventory store.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<InventoryStore>,
    policy: Arc<AccessPolicy>,
    clock: Arc<dyn Clock>,
    config: Arc<InventoryConfig>,
}

impl InventoryService {
    /// Create a new inventory service
    #[must_use]
    pub fn new(
        store: Arc<InventoryStore>,
        policy: Arc<AccessPolicy>,
        clock: Arc<dyn Clock>,
        config: Arc<InventoryConfig>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            config,
        }
    }

    /// Wire a fresh store, with its own dead letter queue, behind a service.
    #[must_use]
    pub fn build(
        clock: Arc<dyn Clock>,
        sink: Arc<dyn TransactionSink>,
        inventory: InventoryConfig,
        access: &AccessConfig,
    ) -> Self {
        let dlq = DeadLetterQueue::default();
        let config = Arc::new(inventory.clone());
        let environment = InventoryEnvironment::new(Arc::clone(&clock), sink, inventory, dlq.clone());
        let store = Store::with_config(
            InventoryState::new(),
            InventoryReducer::new(),
            environment,
            StoreConfig::default().with_dlq(dlq),
        );
        Self::new(
            Arc::new(store),
            Arc::new(AccessPolicy::new(access)),
            clock,
            config,
        )
    }

    /// Underlying store
    #[must_use]
    pub const fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    /// Access policy in force
    #[must_use]
    pub const fn policy(&self) -> &Arc<AccessPolicy> {
        &self.policy
    }

    /// Inventory rules in force
    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Current time on the service clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Send a command and wait for its outcome.
    ///
    /// # Errors
    ///
    /// The command's own rejection, or [`InventoryError::Timeout`] /
    /// [`InventoryError::Unavailable`] when the store does not answer.
    pub async fn dispatch(&self, action: InventoryAction) -> InventoryResult<InventoryUpdate> {
        let request_id = action.request_id();
        let action_name = action.action_name();

        let outcome = self
            .store
            .send_and_wait_for(
                action,
                move |candidate| candidate.is_event() && candidate.request_id() == request_id,
                self.config.command_timeout(),
            )
            .await
            .inspect_err(|error| {
                tracing::warn!(
                    request_id = %request_id,
                    action = action_name,
                    error = %error,
                    "Command did not complete"
                );
            })?;

        outcome.outcome_for(request_id).unwrap_or_else(|| {
            Err(InventoryError::Unavailable(format!(
                "no outcome for request {request_id}"
            )))
        })
    }

    /// Require `capability`, unless the context owns `session_id`.
    fn authorize_session(
        &self,
        ctx: &SessionContext,
        session_id: &SessionId,
        capability: Capability,
    ) -> InventoryResult<()> {
        if ctx.session_id.as_ref() == Some(session_id) {
            Ok(())
        } else {
            self.policy.authorize(ctx, capability).map_err(|_| {
                InventoryError::Forbidden(format!(
                    "{} does not own session {session_id}",
                    ctx.effective().email
                ))
            })
        }
    }

    /// Owner check for hold-level commands. Unknown holds pass through so
    /// the command itself reports them.
    async fn authorize_hold(&self, ctx: &SessionContext, hold_id: HoldId) -> InventoryResult<()> {
        self.policy.authorize(ctx, Capability::HoldTickets)?;
        let owner = self
            .store
            .state(|state| state.holds.get(&hold_id).map(|hold| hold.session_id.clone()))
            .await;
        match owner {
            Some(session_id) => self.authorize_session(ctx, &session_id, Capability::ReleaseAnyHold),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Inventory records
    // ------------------------------------------------------------------

    /// Put a ticket type on sale.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::AdjustInventory`]; validation errors
    /// for an empty name, zero total or duplicate id.
    pub async fn register_ticket_type(
        &self,
        ctx: &SessionContext,
        event_id: EventId,
        request: RegisterTicketTypeRequest,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::AdjustInventory)?;
        self.dispatch(InventoryAction::RegisterTicketType {
            request_id: RequestId::new(),
            event_id,
            ticket_type_id: request.ticket_type_id.unwrap_or_default(),
            name: request.name,
            total: request.total,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Inventory of an event as of now.
    ///
    /// # Errors
    ///
    /// [`InventoryError::EventNotFound`] when the event has no ticket types.
    pub async fn get_status(
        &self,
        ctx: &SessionContext,
        event_id: EventId,
    ) -> InventoryResult<EventInventoryStatus> {
        self.policy.authorize(ctx, Capability::ViewInventory)?;
        let now = self.now();
        self.store
            .state(|state| state.event_status(event_id, now))
            .await
            .ok_or(InventoryError::EventNotFound(event_id))
    }

    /// Availability classification of a ticket type.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::ViewInventory`].
    pub async fn availability(
        &self,
        ctx: &SessionContext,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
    ) -> InventoryResult<AvailabilityStatus> {
        self.policy.authorize(ctx, Capability::ViewInventory)?;
        let now = self.now();
        let thresholds = self.config.thresholds();
        Ok(self
            .store
            .state(|state| state.availability(event_id, ticket_type_id, thresholds, now))
            .await)
    }

    // ------------------------------------------------------------------
    // Holds
    // ------------------------------------------------------------------

    /// Reserve units. The caller's session owns the hold unless the request
    /// names one.
    ///
    /// # Errors
    ///
    /// Forbidden without the capability for the hold category, or when
    /// placing the hold on another session without
    /// [`Capability::ReleaseAnyHold`]; validation and not-found errors from
    /// the command. A conflict that grants nothing
    /// is returned as `Ok` with `success == false`.
    pub async fn create_hold(
        &self,
        ctx: &SessionContext,
        request: CreateHoldRequest,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy
            .authorize(ctx, AccessPolicy::hold_capability(request.hold_type))?;
        let session_id = match request.session_id {
            Some(session_id) => {
                self.authorize_session(ctx, &session_id, Capability::ReleaseAnyHold)?;
                Some(session_id)
            },
            None => ctx.session_id.clone(),
        };
        self.dispatch(InventoryAction::CreateHold {
            request_id: RequestId::new(),
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            quantity: request.quantity,
            session_id,
            hold_type: request.hold_type,
            duration_minutes: request.duration_minutes,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Release a hold. Releasing an unknown or finished hold succeeds
    /// without changing anything.
    ///
    /// # Errors
    ///
    /// Forbidden when the hold belongs to another session and the caller
    /// lacks [`Capability::ReleaseAnyHold`].
    pub async fn release_hold(
        &self,
        ctx: &SessionContext,
        hold_id: HoldId,
        reason: Option<String>,
    ) -> InventoryResult<InventoryUpdate> {
        self.authorize_hold(ctx, hold_id).await?;
        self.dispatch(InventoryAction::ReleaseHold {
            request_id: RequestId::new(),
            hold_id,
            reason,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Push a hold's expiry forward.
    ///
    /// # Errors
    ///
    /// Not found, not active, or forbidden for another session's hold.
    pub async fn extend_hold(
        &self,
        ctx: &SessionContext,
        hold_id: HoldId,
        additional_minutes: u32,
    ) -> InventoryResult<InventoryUpdate> {
        self.authorize_hold(ctx, hold_id).await?;
        self.dispatch(InventoryAction::ExtendHold {
            request_id: RequestId::new(),
            hold_id,
            additional_minutes,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Change a hold's quantity.
    ///
    /// # Errors
    ///
    /// Not found, not active, insufficient stock for an increase, or
    /// forbidden for another session's hold.
    pub async fn update_hold(
        &self,
        ctx: &SessionContext,
        hold_id: HoldId,
        quantity: u32,
    ) -> InventoryResult<InventoryUpdate> {
        self.authorize_hold(ctx, hold_id).await?;
        self.dispatch(InventoryAction::UpdateHold {
            request_id: RequestId::new(),
            hold_id,
            quantity,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Release every active hold of a session.
    ///
    /// # Errors
    ///
    /// Forbidden for another session without [`Capability::ReleaseAnyHold`].
    pub async fn release_session_holds(
        &self,
        ctx: &SessionContext,
        session_id: SessionId,
        reason: Option<String>,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::HoldTickets)?;
        self.authorize_session(ctx, &session_id, Capability::ReleaseAnyHold)?;
        self.dispatch(InventoryAction::ReleaseSessionHolds {
            request_id: RequestId::new(),
            session_id,
            reason,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// A hold with its status as of now.
    ///
    /// # Errors
    ///
    /// [`InventoryError::HoldNotFound`] for unknown ids.
    pub async fn hold(&self, ctx: &SessionContext, hold_id: HoldId) -> InventoryResult<Hold> {
        self.policy.authorize(ctx, Capability::ViewInventory)?;
        let now = self.now();
        self.store
            .state(|state| state.hold_at(hold_id, now))
            .await
            .ok_or(InventoryError::HoldNotFound(hold_id))
    }

    /// Active holds of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Forbidden for another session without [`Capability::ReleaseAnyHold`].
    pub async fn session_holds(
        &self,
        ctx: &SessionContext,
        session_id: &SessionId,
    ) -> InventoryResult<Vec<Hold>> {
        self.policy.authorize(ctx, Capability::ViewInventory)?;
        self.authorize_session(ctx, session_id, Capability::ReleaseAnyHold)?;
        let now = self.now();
        Ok(self
            .store
            .state(|state| state.session_holds(session_id, now))
            .await)
    }

    /// Expire overdue holds now, everywhere or for one event.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::RunBulkOperations`].
    pub async fn sweep(
        &self,
        ctx: &SessionContext,
        event_id: Option<EventId>,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::RunBulkOperations)?;
        self.sweep_expired(event_id).await
    }

    /// Unauthenticated sweep used by the background sweeper.
    ///
    /// # Errors
    ///
    /// Store timeouts and shutdown.
    pub async fn sweep_expired(&self, event_id: Option<EventId>) -> InventoryResult<InventoryUpdate> {
        self.dispatch(InventoryAction::SweepExpired {
            request_id: RequestId::new(),
            event_id,
        })
        .await
    }

    // ------------------------------------------------------------------
    // Sales
    // ------------------------------------------------------------------

    /// Buy tickets.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::PurchaseTickets`] or when converting
    /// another session's hold; insufficient stock and validation errors from
    /// the command.
    pub async fn purchase(
        &self,
        ctx: &SessionContext,
        request: PurchaseRequest,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::PurchaseTickets)?;
        let session_id = match request.session_id {
            Some(session_id) => {
                self.authorize_session(ctx, &session_id, Capability::ReleaseAnyHold)?;
                Some(session_id)
            },
            None => ctx.session_id.clone(),
        };
        self.dispatch(InventoryAction::Purchase {
            request_id: RequestId::new(),
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            quantity: request.quantity,
            session_id,
            order_id: request.order_id,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Return sold tickets to availability.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::ProcessRefunds`]; validation errors
    /// when refunding more than was sold.
    pub async fn refund(
        &self,
        ctx: &SessionContext,
        request: RefundRequest,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::ProcessRefunds)?;
        self.dispatch(InventoryAction::Refund {
            request_id: RequestId::new(),
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            quantity: request.quantity,
            order_id: request.order_id,
            reason: request.reason,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    /// Change a ticket type's total.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::AdjustInventory`]; validation errors
    /// when the total would drop below what is sold and held.
    pub async fn adjust_inventory(
        &self,
        ctx: &SessionContext,
        request: AdjustmentRequest,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::AdjustInventory)?;
        self.dispatch(InventoryAction::AdjustInventory {
            request_id: RequestId::new(),
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            delta: request.delta,
            reason: request.reason,
            actor: Some(ctx.actor_label()),
        })
        .await
    }

    // ------------------------------------------------------------------
    // Ledger and alerts
    // ------------------------------------------------------------------

    /// Ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::ViewTransactions`].
    pub async fn transactions(
        &self,
        ctx: &SessionContext,
        filter: TransactionFilter,
    ) -> InventoryResult<Vec<InventoryTransaction>> {
        self.policy.authorize(ctx, Capability::ViewTransactions)?;
        Ok(self.store.state(|state| state.transactions(&filter)).await)
    }

    /// Alerts, newest first.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::ViewTransactions`].
    pub async fn alerts(
        &self,
        ctx: &SessionContext,
        event_id: Option<EventId>,
    ) -> InventoryResult<Vec<InventoryAlert>> {
        self.policy.authorize(ctx, Capability::ViewTransactions)?;
        Ok(self.store.state(|state| state.alerts(event_id)).await)
    }

    /// Mark an alert as seen.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::AdjustInventory`];
    /// [`InventoryError::AlertNotFound`] for unknown ids.
    pub async fn acknowledge_alert(
        &self,
        ctx: &SessionContext,
        alert_id: AlertId,
    ) -> InventoryResult<InventoryUpdate> {
        self.policy.authorize(ctx, Capability::AdjustInventory)?;
        self.dispatch(InventoryAction::AcknowledgeAlert {
            request_id: RequestId::new(),
            alert_id,
        })
        .await
    }
}

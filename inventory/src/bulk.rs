//! Bulk inventory operations.
//!
//! A bulk operation applies a batch of requests one by one through the
//! [`InventoryService`], so every item is authorized and validated exactly
//! like a single request. Items that succeed stay applied when later items
//! fail; the per-item results show what happened.
//!
//! Finished operations stay queryable for `bulk_retention_secs` and at most
//! `max_bulk_operations` are kept; the oldest finished ones are dropped first.

use crate::access::{Capability, SessionContext};
use crate::error::{InventoryError, InventoryResult};
use crate::metrics;
use crate::service::{
    AdjustmentRequest, CreateHoldRequest, InventoryService, PurchaseRequest, RefundRequest,
};
use crate::types::{BulkOperationId, EventId, HoldId, InventoryUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Kind of batch, for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkOperationType {
    /// Release overdue holds
    ReleaseExpired,
    /// Release specific holds
    HoldRelease,
    /// Change totals
    Adjustment,
    /// Anything else, or a mix
    #[default]
    Mixed,
}

impl BulkOperationType {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseExpired => "release-expired",
            Self::HoldRelease => "hold-release",
            Self::Adjustment => "adjustment",
            Self::Mixed => "mixed",
        }
    }
}

/// Lifecycle of a bulk operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkStatus {
    /// Accepted, not started
    Pending,
    /// Items are being applied
    InProgress,
    /// At least one item succeeded, or the batch was empty
    Completed,
    /// Every item failed
    Failed,
}

impl BulkStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One request inside a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum BulkItem {
    /// Create a hold
    CreateHold(CreateHoldRequest),
    /// Release a hold
    ReleaseHold {
        /// Hold id
        hold_id: HoldId,
        /// Why
        #[serde(default)]
        reason: Option<String>,
    },
    /// Buy tickets
    Purchase(PurchaseRequest),
    /// Refund tickets
    Refund(RefundRequest),
    /// Change a total
    Adjust(AdjustmentRequest),
}

/// Request body for a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkRequest {
    /// Kind of batch
    #[serde(default)]
    pub operation_type: BulkOperationType,
    /// Event the batch concerns, if any
    #[serde(default)]
    pub event_id: Option<EventId>,
    /// Items, applied in order
    pub items: Vec<BulkItem>,
}

/// Outcome of one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// Position in the batch
    pub index: usize,
    /// Whether the item was carried out
    pub success: bool,
    /// Outcome when the request was processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<InventoryUpdate>,
    /// Error code when the request was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Message, from the update or the error
    pub message: String,
}

impl BulkItemResult {
    fn from_outcome(index: usize, outcome: InventoryResult<InventoryUpdate>) -> Self {
        match outcome {
            Ok(update) => Self {
                index,
                success: update.success,
                message: update.message.clone(),
                update: Some(update),
                error_code: None,
            },
            Err(error) => Self {
                index,
                success: false,
                update: None,
                error_code: Some(error.code().to_string()),
                message: error.to_string(),
            },
        }
    }
}

/// A batch and its results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOperation {
    /// Operation id
    pub id: BulkOperationId,
    /// Kind of batch
    pub operation_type: BulkOperationType,
    /// Event the batch concerns, if any
    pub event_id: Option<EventId>,
    /// Current status
    pub status: BulkStatus,
    /// Who submitted it
    pub requested_by: String,
    /// Number of items submitted
    pub item_count: usize,
    /// Items that succeeded
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
    /// Per-item outcomes, in submission order
    pub results: Vec<BulkItemResult>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperation {
    fn pending(
        operation_type: BulkOperationType,
        event_id: Option<EventId>,
        requested_by: String,
        item_count: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BulkOperationId::new(),
            operation_type,
            event_id,
            status: BulkStatus::Pending,
            requested_by,
            item_count,
            succeeded: 0,
            failed: 0,
            results: Vec::with_capacity(item_count),
            created_at: now,
            completed_at: None,
        }
    }

    fn finish(&mut self, results: Vec<BulkItemResult>, now: DateTime<Utc>) {
        self.succeeded = results.iter().filter(|r| r.success).count();
        self.failed = results.len() - self.succeeded;
        self.status = if !results.is_empty() && self.succeeded == 0 {
            BulkStatus::Failed
        } else {
            BulkStatus::Completed
        };
        self.results = results;
        self.completed_at = Some(now);
    }
}

/// Runs batches and remembers their results.
#[derive(Clone)]
pub struct BulkRunner {
    service: InventoryService,
    operations: Arc<RwLock<HashMap<BulkOperationId, BulkOperation>>>,
}

impl BulkRunner {
    /// Runner over `service`
    #[must_use]
    pub fn new(service: InventoryService) -> Self {
        Self {
            service,
            operations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn save(&self, operation: &BulkOperation) {
        let config = self.service.config();
        let mut operations = self.operations.write().await;
        operations.insert(operation.id, operation.clone());
        prune(
            &mut operations,
            self.service.now(),
            config.bulk_retention(),
            config.max_bulk_operations,
        );
    }

    async fn start(&self, mut operation: BulkOperation) -> BulkOperation {
        self.save(&operation).await;
        operation.status = BulkStatus::InProgress;
        self.save(&operation).await;
        tracing::info!(
            operation_id = %operation.id,
            operation_type = operation.operation_type.as_str(),
            items = operation.item_count,
            requested_by = %operation.requested_by,
            "Bulk operation started"
        );
        operation
    }

    async fn complete(&self, mut operation: BulkOperation, results: Vec<BulkItemResult>) -> BulkOperation {
        operation.finish(results, self.service.now());
        self.save(&operation).await;
        metrics::record_bulk_operation(operation.status.as_str());
        tracing::info!(
            operation_id = %operation.id,
            status = operation.status.as_str(),
            succeeded = operation.succeeded,
            failed = operation.failed,
            "Bulk operation finished"
        );
        operation
    }

    async fn apply(&self, ctx: &SessionContext, item: BulkItem) -> InventoryResult<InventoryUpdate> {
        match item {
            BulkItem::CreateHold(request) => self.service.create_hold(ctx, request).await,
            BulkItem::ReleaseHold { hold_id, reason } => {
                self.service.release_hold(ctx, hold_id, reason).await
            },
            BulkItem::Purchase(request) => self.service.purchase(ctx, request).await,
            BulkItem::Refund(request) => self.service.refund(ctx, request).await,
            BulkItem::Adjust(request) => self.service.adjust_inventory(ctx, request).await,
        }
    }

    /// Apply a batch.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::RunBulkOperations`]. Item failures
    /// are reported in the results, not as an error.
    pub async fn submit(
        &self,
        ctx: &SessionContext,
        request: BulkRequest,
    ) -> InventoryResult<BulkOperation> {
        self.service
            .policy()
            .authorize(ctx, Capability::RunBulkOperations)?;

        let operation = self
            .start(BulkOperation::pending(
                request.operation_type,
                request.event_id,
                ctx.actor_label(),
                request.items.len(),
                self.service.now(),
            ))
            .await;

        let mut results = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.into_iter().enumerate() {
            let outcome = self.apply(ctx, item).await;
            if let Err(error) = &outcome {
                tracing::debug!(operation_id = %operation.id, index, error = %error, "Bulk item failed");
            }
            results.push(BulkItemResult::from_outcome(index, outcome));
        }

        Ok(self.complete(operation, results).await)
    }

    /// Release every overdue hold of an event, one result per hold.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::RunBulkOperations`].
    pub async fn release_expired_for_event(
        &self,
        ctx: &SessionContext,
        event_id: EventId,
    ) -> InventoryResult<BulkOperation> {
        self.service
            .policy()
            .authorize(ctx, Capability::RunBulkOperations)?;

        let operation = self
            .start(BulkOperation::pending(
                BulkOperationType::ReleaseExpired,
                Some(event_id),
                ctx.actor_label(),
                0,
                self.service.now(),
            ))
            .await;

        let results = match self.service.sweep_expired(Some(event_id)).await {
            Ok(update) => update
                .affected_holds
                .into_iter()
                .enumerate()
                .map(|(index, hold)| BulkItemResult {
                    index,
                    success: true,
                    message: format!("Hold {} expired ({} tickets)", hold.id, hold.quantity),
                    update: Some(InventoryUpdate {
                        hold: Some(hold),
                        ..InventoryUpdate::succeeded("Hold expired")
                    }),
                    error_code: None,
                })
                .collect(),
            Err(error) => vec![BulkItemResult::from_outcome(0, Err(error))],
        };

        let mut operation = operation;
        operation.item_count = results.len();
        Ok(self.complete(operation, results).await)
    }

    /// A previously submitted operation.
    ///
    /// # Errors
    ///
    /// Forbidden without [`Capability::RunBulkOperations`];
    /// [`InventoryError::BulkOperationNotFound`] for unknown ids.
    pub async fn get(
        &self,
        ctx: &SessionContext,
        id: BulkOperationId,
    ) -> InventoryResult<BulkOperation> {
        self.service
            .policy()
            .authorize(ctx, Capability::RunBulkOperations)?;
        self.operations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(InventoryError::BulkOperationNotFound(id))
    }
}

/// Drop finished operations older than `retention`, then the oldest finished
/// ones beyond `max`. Operations still running are never dropped.
fn prune(
    operations: &mut HashMap<BulkOperationId, BulkOperation>,
    now: DateTime<Utc>,
    retention: Duration,
    max: usize,
) {
    let before = operations.len();
    operations.retain(|_, operation| {
        operation.completed_at.is_none_or(|done| {
            !matches!(now.signed_duration_since(done).to_std(), Ok(age) if age >= retention)
        })
    });

    if operations.len() > max {
        let mut finished: Vec<(DateTime<Utc>, BulkOperationId)> = operations
            .values()
            .filter(|operation| operation.completed_at.is_some())
            .map(|operation| (operation.created_at, operation.id))
            .collect();
        finished.sort();
        let excess = operations.len() - max;
        for (_, id) in finished.into_iter().take(excess) {
            operations.remove(&id);
        }
    }

    let dropped = before.saturating_sub(operations.len());
    if dropped > 0 {
        tracing::debug!(dropped, kept = operations.len(), "Pruned bulk operations");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::access::Identity;
    use crate::config::{AccessConfig, InventoryConfig};
    use crate::ledger::InMemoryTransactionSink;
    use boxoffice_testing::ManualClock;

    fn runner(config: InventoryConfig) -> (BulkRunner, ManualClock) {
        let clock = ManualClock::starting_at(Utc::now());
        let access = AccessConfig {
            admin_emails: vec!["ops@example.com".to_string()],
            api_tokens: vec![],
        };
        let service = InventoryService::build(
            Arc::new(clock.clone()),
            Arc::new(InMemoryTransactionSink::new()),
            config,
            &access,
        );
        (BulkRunner::new(service), clock)
    }

    fn ops() -> SessionContext {
        SessionContext::new(Identity::new("ops", "ops@example.com", vec![]), None)
    }

    fn empty_batch() -> BulkRequest {
        BulkRequest {
            operation_type: BulkOperationType::Mixed,
            event_id: None,
            items: vec![],
        }
    }

    #[tokio::test]
    async fn finished_operations_expire_after_retention() {
        let (runner, clock) = runner(InventoryConfig {
            bulk_retention_secs: 60,
            ..InventoryConfig::default()
        });
        let first = runner.submit(&ops(), empty_batch()).await.unwrap();

        clock.advance(chrono::Duration::seconds(30));
        assert!(runner.get(&ops(), first.id).await.is_ok());

        clock.advance(chrono::Duration::seconds(31));
        let second = runner.submit(&ops(), empty_batch()).await.unwrap();

        assert!(matches!(
            runner.get(&ops(), first.id).await,
            Err(InventoryError::BulkOperationNotFound(_))
        ));
        assert_eq!(runner.get(&ops(), second.id).await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn oldest_operations_go_first_past_the_cap() {
        let (runner, clock) = runner(InventoryConfig {
            max_bulk_operations: 2,
            ..InventoryConfig::default()
        });

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(runner.submit(&ops(), empty_batch()).await.unwrap().id);
            clock.advance(chrono::Duration::seconds(1));
        }

        assert!(runner.get(&ops(), ids[0]).await.is_err());
        assert!(runner.get(&ops(), ids[1]).await.is_ok());
        assert!(runner.get(&ops(), ids[2]).await.is_ok());
        assert_eq!(runner.operations.read().await.len(), 2);
    }

    #[test]
    fn running_operations_are_kept() {
        let now = Utc::now();
        let mut running = BulkOperation::pending(BulkOperationType::Mixed, None, "a".into(), 1, now);
        running.status = BulkStatus::InProgress;
        let mut operations = HashMap::from([(running.id, running.clone())]);

        prune(&mut operations, now + chrono::Duration::days(30), Duration::from_secs(60), 0);

        assert!(operations.contains_key(&running.id));
    }

    #[test]
    fn empty_batch_completes() {
        let mut op = BulkOperation::pending(BulkOperationType::Mixed, None, "a".into(), 0, Utc::now());
        op.finish(vec![], Utc::now());
        assert_eq!(op.status, BulkStatus::Completed);
    }

    #[test]
    fn all_failed_is_failed() {
        let mut op = BulkOperation::pending(BulkOperationType::Mixed, None, "a".into(), 2, Utc::now());
        op.finish(
            vec![
                BulkItemResult::from_outcome(0, Err(InventoryError::validation("bad"))),
                BulkItemResult::from_outcome(1, Ok(InventoryUpdate::declined("Requested quantity not available"))),
            ],
            Utc::now(),
        );
        assert_eq!(op.status, BulkStatus::Failed);
        assert_eq!(op.failed, 2);
        assert_eq!(op.results[0].error_code.as_deref(), Some("VALIDATION_ERROR"));
    }

    #[test]
    fn partial_failure_completes() {
        let mut op = BulkOperation::pending(BulkOperationType::Mixed, None, "a".into(), 2, Utc::now());
        op.finish(
            vec![
                BulkItemResult::from_outcome(0, Ok(InventoryUpdate::succeeded("ok"))),
                BulkItemResult::from_outcome(1, Err(InventoryError::validation("bad"))),
            ],
            Utc::now(),
        );
        assert_eq!(op.status, BulkStatus::Completed);
        assert_eq!((op.succeeded, op.failed), (1, 1));
    }

    #[test]
    fn items_parse_from_tagged_json() {
        let request: BulkRequest = serde_json::from_value(serde_json::json!({
            "operation_type": "hold-release",
            "items": [
                { "action": "release-hold", "hold_id": HoldId::new() },
                {
                    "action": "adjust",
                    "event_id": EventId::new(),
                    "ticket_type_id": crate::types::TicketTypeId::new(),
                    "delta": -2,
                    "reason": "Broken seats"
                }
            ]
        }))
        .unwrap();

        assert_eq!(request.operation_type, BulkOperationType::HoldRelease);
        assert!(matches!(request.items[0], BulkItem::ReleaseHold { .. }));
        assert!(matches!(request.items[1], BulkItem::Adjust(_)));
    }
}

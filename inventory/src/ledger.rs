//! Durable destinations for the transaction ledger.
//!
//! The reducer appends every ledger entry to its own state in the same step
//! as the counter change. Store effects then forward the new entries to a
//! [`TransactionSink`]. Forwarding is retried; entries that still fail are
//! recorded in the store's dead letter queue by id.

use crate::types::InventoryTransaction;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from a ledger sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The backing store rejected the write
    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Append-only destination for ledger entries.
///
/// Appends must be idempotent per transaction id: retries may deliver the
/// same entry more than once.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    /// Append entries in order
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] when the entries could not be written.
    async fn append(&self, entries: &[InventoryTransaction]) -> Result<(), LedgerError>;
}

/// In-memory sink, the default when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionSink {
    entries: Arc<RwLock<Vec<InventoryTransaction>>>,
}

impl InMemoryTransactionSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, oldest first
    pub async fn entries(&self) -> Vec<InventoryTransaction> {
        self.entries.read().await.clone()
    }

    /// Number of entries appended
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing has been appended
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionSink for InMemoryTransactionSink {
    async fn append(&self, entries: &[InventoryTransaction]) -> Result<(), LedgerError> {
        let mut stored = self.entries.write().await;
        for entry in entries {
            if !stored.iter().any(|existing| existing.id == entry.id) {
                stored.push(entry.clone());
            }
        }
        Ok(())
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresTransactionSink;

#[cfg(feature = "postgres")]
mod postgres {
    use super::{LedgerError, TransactionSink, async_trait};
    use crate::types::InventoryTransaction;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;

    const SCHEMA: &str = include_str!("../migrations/001_inventory_transactions.sql");

    /// `PostgreSQL` ledger. Rows are never updated or deleted.
    #[derive(Debug, Clone)]
    pub struct PostgresTransactionSink {
        pool: PgPool,
    }

    impl PostgresTransactionSink {
        /// Wrap an existing pool
        #[must_use]
        pub const fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Connect to `url` with at most `max_connections` connections
        ///
        /// # Errors
        ///
        /// [`LedgerError::Storage`] if the connection fails.
        pub async fn connect(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
            Ok(Self::new(pool))
        }

        /// Create the ledger table if it does not exist
        ///
        /// # Errors
        ///
        /// [`LedgerError::Storage`] if the DDL fails.
        pub async fn migrate(&self) -> Result<(), LedgerError> {
            sqlx::raw_sql(SCHEMA)
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
            Ok(())
        }
    }

    #[async_trait]
    impl TransactionSink for PostgresTransactionSink {
        async fn append(&self, entries: &[InventoryTransaction]) -> Result<(), LedgerError> {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;

            for entry in entries {
                let metadata = serde_json::to_value(&entry.metadata)
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;

                sqlx::query(
                    r"
                    INSERT INTO inventory_transactions (
                        id, event_id, ticket_type_id, transaction_type, quantity,
                        available_before, available_after, actor_id, session_id,
                        order_id, reason, created_at, metadata
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    ON CONFLICT (id) DO NOTHING
                    ",
                )
                .bind(*entry.id.as_uuid())
                .bind(*entry.event_id.as_uuid())
                .bind(*entry.ticket_type_id.as_uuid())
                .bind(entry.transaction_type.as_str())
                .bind(entry.quantity)
                .bind(i64::from(entry.available_before))
                .bind(i64::from(entry.available_after))
                .bind(entry.actor_id.as_deref())
                .bind(entry.session_id.as_ref().map(crate::types::SessionId::as_str))
                .bind(entry.order_id.as_deref())
                .bind(&entry.reason)
                .bind(entry.timestamp)
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;

            metrics::counter!("boxoffice_ledger_rows_written_total").increment(entries.len() as u64);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventId, TicketTypeId, TransactionId, TransactionType};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn entry() -> InventoryTransaction {
        InventoryTransaction {
            id: TransactionId::new(),
            event_id: EventId::new(),
            ticket_type_id: TicketTypeId::new(),
            transaction_type: TransactionType::HoldCreate,
            quantity: -2,
            available_before: 10,
            available_after: 8,
            actor_id: None,
            session_id: None,
            order_id: None,
            reason: "Hold created for checkout".to_string(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_sink_keeps_order() {
        let sink = InMemoryTransactionSink::new();
        let first = entry();
        let second = entry();

        sink.append(&[first.clone(), second.clone()]).await.unwrap();

        assert_eq!(sink.entries().await, vec![first, second]);
    }

    #[tokio::test]
    async fn redelivered_entries_are_not_duplicated() {
        let sink = InMemoryTransactionSink::new();
        let e = entry();

        sink.append(std::slice::from_ref(&e)).await.unwrap();
        sink.append(std::slice::from_ref(&e)).await.unwrap();

        assert_eq!(sink.len().await, 1);
    }
}

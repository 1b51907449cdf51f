//! Box office inventory: ticket holds, conflict resolution and an
//! append-only transaction ledger.
//!
//! Every ticket type of an event has a fixed total split into sold, held
//! and available units. Checkout sessions take temporary holds on units;
//! holds expire on their own, are released, or are converted into sales.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (axum)          HoldSweeper          BulkRunner
//!        │                    │                    │
//!        └──────────┬─────────┴────────────────────┘
//!                   ▼
//!          InventoryService   (authorization, request ids)
//!                   │ send_and_wait_for
//!                   ▼
//!   Store<InventoryState, InventoryAction, InventoryEnvironment, InventoryReducer>
//!                   │ effects
//!          ┌────────┴─────────┐
//!          ▼                  ▼
//!  CommandApplied /     TransactionSink
//!  CommandRejected      (memory or PostgreSQL)
//! ```
//!
//! # Key guarantees
//!
//! - `sold + held <= total` for every ticket type, at every step
//! - A unit is never granted to two holds: availability is checked and
//!   taken inside one reducer step under the store's write lock
//! - Releasing a hold twice changes nothing the second time
//! - Overdue holds count as expired for every read, before any sweep runs
//! - Every counter change writes a ledger entry in the same step
//!
//! See the [aggregates] module for the reducer and its tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod aggregates;
pub mod api;
pub mod availability;
pub mod bulk;
pub mod config;
pub mod conflict;
pub mod error;
pub mod hold_timer;
pub mod ledger;
pub mod metrics;
pub mod server;
pub mod service;
pub mod sweeper;
pub mod types;

pub use access::{
    AccessPolicy, Capability, Identity, Role, SessionContext, SessionResolver, StaticTokenResolver,
};
pub use aggregates::{InventoryAction, InventoryEnvironment, InventoryReducer, InventoryState};
pub use bulk::{BulkOperation, BulkRequest, BulkRunner};
pub use config::{Config, InventoryConfig};
pub use conflict::ConflictPolicy;
pub use error::{InventoryError, InventoryResult};
pub use hold_timer::{HoldTimer, TimerSnapshot, Urgency};
pub use service::{InventoryService, InventoryStore};
pub use sweeper::HoldSweeper;
pub use types::*;

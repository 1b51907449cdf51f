//! Application state shared by every HTTP handler.

use crate::access::SessionResolver;
use crate::api::IdempotencyCache;
use crate::bulk::BulkRunner;
use crate::service::InventoryService;
use boxoffice_runtime::metrics::MetricsServer;
use std::sync::Arc;

/// Application state, cloned (cheaply, via `Arc`s) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Authorized access to the inventory store
    pub service: InventoryService,
    /// Batch runner and its history
    pub bulk: BulkRunner,
    /// Bearer token and impersonation target lookup
    pub resolver: Arc<dyn SessionResolver>,
    /// Replay cache for `Idempotency-Key` requests
    pub idempotency: IdempotencyCache,
    /// Prometheus exporter, when one was started
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        service: InventoryService,
        resolver: Arc<dyn SessionResolver>,
        idempotency: IdempotencyCache,
    ) -> Self {
        Self {
            bulk: BulkRunner::new(service.clone()),
            service,
            resolver,
            idempotency,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

//! Business metrics for the inventory service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_holds_total{status}` - holds by lifecycle step (created, released, expired, converted)
//! - `boxoffice_conflicts_total{resolution}` - conflicts by resolution type
//! - `boxoffice_tickets_sold_total` - tickets sold
//! - `boxoffice_tickets_refunded_total` - tickets refunded
//! - `boxoffice_invariant_violations_total` - rejected mutations that would oversell
//! - `boxoffice_bulk_operations_total{status}` - bulk operations by final status
//!
//! ## Histograms
//! - `boxoffice_sweep_expired_holds` - holds expired per sweep

use crate::types::ResolutionType;
use metrics::{describe_counter, describe_histogram};

/// Register metric descriptions. Call once at startup, after the recorder
/// is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_holds_total",
        "Holds by lifecycle step (created, released, expired, converted)"
    );
    describe_counter!(
        "boxoffice_conflicts_total",
        "Hold requests that exceeded availability, by resolution"
    );
    describe_counter!("boxoffice_tickets_sold_total", "Total number of tickets sold");
    describe_counter!(
        "boxoffice_tickets_refunded_total",
        "Total number of tickets refunded"
    );
    describe_counter!(
        "boxoffice_invariant_violations_total",
        "Mutations rejected because sold + held would exceed total"
    );
    describe_counter!(
        "boxoffice_bulk_operations_total",
        "Bulk operations by final status"
    );
    describe_histogram!(
        "boxoffice_sweep_expired_holds",
        "Number of holds expired by each sweep"
    );

    tracing::info!("Business metrics registered");
}

/// Record a hold lifecycle step
pub fn record_hold(status: &'static str, quantity: u32) {
    metrics::counter!("boxoffice_holds_total", "status" => status).increment(1);
    tracing::trace!(status, quantity, "Recorded hold metric");
}

/// Record a resolved conflict
pub fn record_conflict(resolution: ResolutionType) {
    metrics::counter!("boxoffice_conflicts_total", "resolution" => resolution.as_str())
        .increment(1);
}

/// Record sold tickets
pub fn record_tickets_sold(quantity: u32) {
    metrics::counter!("boxoffice_tickets_sold_total").increment(u64::from(quantity));
}

/// Record refunded tickets
pub fn record_tickets_refunded(quantity: u32) {
    metrics::counter!("boxoffice_tickets_refunded_total").increment(u64::from(quantity));
}

/// Record a rejected mutation that would have broken `sold + held <= total`
pub fn record_invariant_violation() {
    metrics::counter!("boxoffice_invariant_violations_total").increment(1);
}

/// Record a finished bulk operation
pub fn record_bulk_operation(status: &'static str) {
    metrics::counter!("boxoffice_bulk_operations_total", "status" => status).increment(1);
}

/// Record the size of a sweep
#[allow(clippy::cast_precision_loss)]
pub fn record_sweep(expired: usize) {
    metrics::histogram!("boxoffice_sweep_expired_holds").record(expired as f64);
}

//! Stock level classification and low-stock alerts.

use crate::types::{
    AlertId, AlertKind, AlertSeverity, AvailabilityLevel, AvailabilityStatus, InventoryAlert,
    InventoryRecord, TicketTypeId,
};
use chrono::{DateTime, Utc};

/// Thresholds for the low and critical stock levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockThresholds {
    /// At or below this many available units, stock is low
    pub low: u32,
    /// At or below this many available units, stock is critical
    pub critical: u32,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self { low: 10, critical: 5 }
    }
}

/// Classify `available` units out of `total`.
#[must_use]
pub fn classify(
    ticket_type_id: TicketTypeId,
    available: u32,
    total: u32,
    thresholds: StockThresholds,
) -> AvailabilityStatus {
    let (level, message) = if available == 0 {
        (AvailabilityLevel::SoldOut, "Sold Out".to_string())
    } else if available <= thresholds.critical {
        (AvailabilityLevel::CriticalStock, format!("Only {available} left!"))
    } else if available <= thresholds.low {
        (AvailabilityLevel::LowStock, format!("Only {available} remaining"))
    } else {
        (AvailabilityLevel::Available, format!("{available} available"))
    };

    AvailabilityStatus {
        ticket_type_id,
        level,
        available,
        total,
        message,
    }
}

/// Status for a ticket type that has no inventory record yet.
#[must_use]
pub fn coming_soon(ticket_type_id: TicketTypeId) -> AvailabilityStatus {
    AvailabilityStatus {
        ticket_type_id,
        level: AvailabilityLevel::ComingSoon,
        available: 0,
        total: 0,
        message: "Tickets not yet available".to_string(),
    }
}

fn alert_kind(available: u32, thresholds: StockThresholds) -> Option<AlertKind> {
    if available == 0 {
        Some(AlertKind::SoldOut)
    } else if available <= thresholds.low {
        Some(AlertKind::LowStock)
    } else {
        None
    }
}

/// Alert for a mutation that moved `record` from `available_before` into a
/// sold-out or low-stock level. Staying within the same level raises nothing.
#[must_use]
pub fn alert_for_transition(
    record: &InventoryRecord,
    available_before: u32,
    thresholds: StockThresholds,
    now: DateTime<Utc>,
) -> Option<InventoryAlert> {
    let available = record.available();
    let kind = alert_kind(available, thresholds)?;
    if alert_kind(available_before, thresholds) == Some(kind) {
        return None;
    }

    let (message, severity) = match kind {
        AlertKind::SoldOut => (
            format!("{} is now sold out", record.name),
            AlertSeverity::Warning,
        ),
        AlertKind::LowStock => (
            format!("{} is running low ({available} left)", record.name),
            AlertSeverity::Info,
        ),
    };

    Some(InventoryAlert {
        id: AlertId::new(),
        kind,
        event_id: record.event_id,
        ticket_type_id: record.ticket_type_id,
        message,
        severity,
        timestamp: now,
        acknowledged: false,
    })
}

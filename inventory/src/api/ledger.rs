//! Ledger and alert endpoints.

use super::{ApiResponse, Session};
use crate::server::state::AppState;
use crate::types::{AlertId, EventId, InventoryAlert, InventoryTransaction, TransactionFilter};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use boxoffice_web::AppError;
use serde::Deserialize;

/// Query parameters for alerts
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    /// Restrict to an event
    pub event_id: Option<EventId>,
}

/// Ledger entries, newest first.
///
/// ```bash
/// curl "http://localhost:8080/api/transactions?event_id=<event_id>" \
///   -H "Authorization: Bearer <token>"
/// ```
///
/// # Errors
///
/// 403 without ledger permission.
pub async fn list_transactions(
    Session(ctx): Session,
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<InventoryTransaction>>, AppError> {
    Ok(Json(state.service.transactions(&ctx, filter).await?))
}

/// Alerts, newest first.
///
/// # Errors
///
/// 403 without ledger permission.
pub async fn list_alerts(
    Session(ctx): Session,
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Vec<InventoryAlert>>, AppError> {
    Ok(Json(state.service.alerts(&ctx, query.event_id).await?))
}

/// Mark an alert as seen.
///
/// # Errors
///
/// 404 for unknown alerts.
pub async fn acknowledge_alert(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(alert_id): Path<AlertId>,
) -> Result<ApiResponse, AppError> {
    let update = state.service.acknowledge_alert(&ctx, alert_id).await?;
    ApiResponse::ok(&update)
}

//! Bulk endpoints.
//!
//! - POST /api/bulk - apply a batch of items in order
//! - GET /api/bulk/:operation_id - a submitted batch and its results
//! - POST /api/events/:event_id/release-expired - expire an event's overdue holds

use super::{ApiResponse, Idempotency, Session};
use crate::bulk::{BulkOperation, BulkRequest};
use crate::server::state::AppState;
use crate::types::{BulkOperationId, EventId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_web::AppError;

/// Apply a batch. Items run one after another; a failing item is
/// recorded and does not stop the rest.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/bulk \
///   -H "Authorization: Bearer <admin-token>" \
///   -H "Content-Type: application/json" \
///   -d '{"operation_type": "hold-release", "items": [
///         {"action": "release-hold", "hold_id": "..."}
///       ]}'
/// ```
///
/// # Errors
///
/// 403 without bulk permission.
pub async fn submit(
    Session(ctx): Session,
    State(state): State<AppState>,
    idempotency: Idempotency,
    Json(request): Json<BulkRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let operation = state.bulk.submit(&ctx, request).await?;
            ApiResponse::json(StatusCode::CREATED, &operation)
        })
        .await
}

/// A submitted batch.
///
/// # Errors
///
/// 404 for unknown operations.
pub async fn get_operation(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(operation_id): Path<BulkOperationId>,
) -> Result<Json<BulkOperation>, AppError> {
    Ok(Json(state.bulk.get(&ctx, operation_id).await?))
}

/// Expire an event's overdue holds, one result per hold.
///
/// # Errors
///
/// 403 without bulk permission.
pub async fn release_expired(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<ApiResponse, AppError> {
    let operation = state.bulk.release_expired_for_event(&ctx, event_id).await?;
    ApiResponse::ok(&operation)
}

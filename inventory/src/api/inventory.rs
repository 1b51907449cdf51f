//! Inventory endpoints.
//!
//! - GET /api/events/:event_id/inventory - per-ticket-type counters
//! - GET /api/events/:event_id/ticket-types/:ticket_type_id/availability
//! - POST /api/events/:event_id/ticket-types - put a ticket type on sale
//! - POST /api/adjustments - change a ticket type's total
//! - POST /api/sweep - expire overdue holds now

use super::{ApiResponse, Idempotency, Session};
use crate::server::state::AppState;
use crate::service::{AdjustmentRequest, RegisterTicketTypeRequest};
use crate::types::{AvailabilityStatus, EventId, EventInventoryStatus, TicketTypeId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_web::AppError;
use serde::Deserialize;

/// Optional body for sweeps
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Restrict the sweep to one event
    pub event_id: Option<EventId>,
}

/// Inventory of an event.
///
/// ```bash
/// curl http://localhost:8080/api/events/<event_id>/inventory \
///   -H "Authorization: Bearer <token>"
/// ```
///
/// # Errors
///
/// 404 when the event has no ticket types.
pub async fn get_inventory(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventInventoryStatus>, AppError> {
    Ok(Json(state.service.get_status(&ctx, event_id).await?))
}

/// Availability level of a ticket type. Unknown ticket types report
/// sold out.
///
/// # Errors
///
/// 403 without view permission.
pub async fn get_availability(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path((event_id, ticket_type_id)): Path<(EventId, TicketTypeId)>,
) -> Result<Json<AvailabilityStatus>, AppError> {
    Ok(Json(
        state
            .service
            .availability(&ctx, event_id, ticket_type_id)
            .await?,
    ))
}

/// Put a ticket type on sale.
///
/// # Errors
///
/// 403 without adjust permission, 422 for an empty name, zero total or
/// duplicate id.
pub async fn register_ticket_type(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    idempotency: Idempotency,
    Json(request): Json<RegisterTicketTypeRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state
                .service
                .register_ticket_type(&ctx, event_id, request)
                .await?;
            ApiResponse::json(StatusCode::CREATED, &update)
        })
        .await
}

/// Change a ticket type's total.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/adjustments \
///   -H "Authorization: Bearer <admin-token>" \
///   -H "Content-Type: application/json" \
///   -d '{"event_id": "...", "ticket_type_id": "...", "delta": -20, "reason": "Stage extension"}'
/// ```
///
/// # Errors
///
/// 403 without adjust permission, 422 when the total would drop below what
/// is sold and held.
pub async fn adjust_inventory(
    Session(ctx): Session,
    State(state): State<AppState>,
    idempotency: Idempotency,
    Json(request): Json<AdjustmentRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state.service.adjust_inventory(&ctx, request).await?;
            ApiResponse::ok(&update)
        })
        .await
}

/// Expire overdue holds now.
///
/// # Errors
///
/// 403 without bulk permission.
pub async fn sweep(
    Session(ctx): Session,
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<ApiResponse, AppError> {
    let Json(request) = body.unwrap_or_default();
    let update = state.service.sweep(&ctx, request.event_id).await?;
    ApiResponse::ok(&update)
}

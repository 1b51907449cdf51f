//! Hold endpoints.
//!
//! - POST /api/holds - create a hold
//! - GET /api/holds/:hold_id - hold with its current status
//! - PUT /api/holds/:hold_id - change quantity
//! - POST /api/holds/:hold_id/release - release (idempotent)
//! - POST /api/holds/:hold_id/extend - push expiry forward
//! - GET /api/holds/:hold_id/timer - countdown snapshot
//! - GET /api/sessions/:session_id/holds - a session's holds and soonest timer
//! - POST /api/sessions/:session_id/release - release all of a session's holds

use super::{ApiResponse, Idempotency, Session};
use crate::hold_timer::{self, TimerSnapshot, TimerSummary};
use crate::server::state::AppState;
use crate::service::CreateHoldRequest;
use crate::types::{Hold, HoldId, InventoryUpdate, SessionId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_web::AppError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Optional body for releases
#[derive(Debug, Default, Deserialize)]
pub struct ReleaseRequest {
    /// Why the hold is released
    pub reason: Option<String>,
}

/// Body for extensions
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    /// Minutes to add to the expiry
    pub additional_minutes: u32,
}

/// Body for quantity changes
#[derive(Debug, Deserialize)]
pub struct UpdateHoldRequest {
    /// New quantity
    pub quantity: u32,
}

/// A session's holds
#[derive(Debug, Serialize)]
pub struct SessionHoldsResponse {
    /// Session id
    pub session_id: SessionId,
    /// Active holds, oldest first
    pub holds: Vec<Hold>,
    /// Countdown of the soonest-expiring hold
    pub timer: Option<TimerSummary>,
}

fn update_status(update: &InventoryUpdate, created: bool) -> StatusCode {
    match (update.success, created) {
        (false, _) => StatusCode::CONFLICT,
        (true, true) => StatusCode::CREATED,
        (true, false) => StatusCode::OK,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a hold.
///
/// 201 with the hold (and a conflict record when partially fulfilled), or
/// 409 with the conflict record when nothing could be granted.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/holds \
///   -H "Authorization: Bearer <token>" \
///   -H "X-Session-ID: session_abc" \
///   -H "Content-Type: application/json" \
///   -d '{"event_id": "...", "ticket_type_id": "...", "quantity": 2}'
/// ```
///
/// # Errors
///
/// 401/403 for missing credentials or capability, 404 for an unknown ticket
/// type, 422 for invalid quantities or durations.
pub async fn create_hold(
    Session(ctx): Session,
    State(state): State<AppState>,
    idempotency: Idempotency,
    Json(request): Json<CreateHoldRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state.service.create_hold(&ctx, request).await?;
            ApiResponse::json(update_status(&update, true), &update)
        })
        .await
}

/// Hold with its status as of now.
///
/// # Errors
///
/// 404 for unknown holds.
pub async fn get_hold(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(hold_id): Path<HoldId>,
) -> Result<Json<Hold>, AppError> {
    Ok(Json(state.service.hold(&ctx, hold_id).await?))
}

/// Release a hold. Unknown or finished holds answer 200 with a message
/// saying nothing changed.
///
/// # Errors
///
/// 403 when releasing another session's hold without permission.
pub async fn release_hold(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(hold_id): Path<HoldId>,
    idempotency: Idempotency,
    body: Option<Json<ReleaseRequest>>,
) -> Result<ApiResponse, AppError> {
    let Json(request) = body.unwrap_or_default();
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state.service.release_hold(&ctx, hold_id, request.reason).await?;
            ApiResponse::ok(&update)
        })
        .await
}

/// Push a hold's expiry forward.
///
/// # Errors
///
/// 404 for unknown holds, 409 for expired or released holds.
pub async fn extend_hold(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(hold_id): Path<HoldId>,
    idempotency: Idempotency,
    Json(request): Json<ExtendRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state
                .service
                .extend_hold(&ctx, hold_id, request.additional_minutes)
                .await?;
            ApiResponse::ok(&update)
        })
        .await
}

/// Change a hold's quantity.
///
/// # Errors
///
/// 404 for unknown holds, 409 for inactive holds or insufficient stock.
pub async fn update_hold(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(hold_id): Path<HoldId>,
    idempotency: Idempotency,
    Json(request): Json<UpdateHoldRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state
                .service
                .update_hold(&ctx, hold_id, request.quantity)
                .await?;
            ApiResponse::ok(&update)
        })
        .await
}

/// Countdown snapshot for a hold.
///
/// # Errors
///
/// 404 for unknown holds, 422 for holds without an expiry.
pub async fn hold_timer(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(hold_id): Path<HoldId>,
) -> Result<Json<TimerSnapshot>, AppError> {
    let hold = state.service.hold(&ctx, hold_id).await?;
    TimerSnapshot::for_hold(&hold, state.service.now())
        .map(Json)
        .ok_or_else(|| AppError::validation("Hold has no expiry"))
}

/// A session's active holds and the soonest countdown.
///
/// # Errors
///
/// 403 for another session without permission.
pub async fn session_holds(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionHoldsResponse>, AppError> {
    let session_id = SessionId::new(session_id);
    let holds = state.service.session_holds(&ctx, &session_id).await?;
    let timer = hold_timer::soonest(&holds, state.service.now());
    Ok(Json(SessionHoldsResponse {
        session_id,
        holds,
        timer,
    }))
}

/// Release every active hold of a session.
///
/// # Errors
///
/// 403 for another session without permission.
pub async fn release_session_holds(
    Session(ctx): Session,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    idempotency: Idempotency,
    body: Option<Json<ReleaseRequest>>,
) -> Result<ApiResponse, AppError> {
    let Json(request) = body.unwrap_or_default();
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state
                .service
                .release_session_holds(&ctx, SessionId::new(session_id), request.reason)
                .await?;
            ApiResponse::ok(&update)
        })
        .await
}

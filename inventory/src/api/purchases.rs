//! Sales endpoints.
//!
//! - POST /api/purchases - buy tickets, converting the session's hold
//! - POST /api/refunds - return sold tickets

use super::{ApiResponse, Idempotency, Session};
use crate::server::state::AppState;
use crate::service::{PurchaseRequest, RefundRequest};
use axum::{Json, extract::State, http::StatusCode};
use boxoffice_web::AppError;

/// Buy tickets.
///
/// When the caller's session holds tickets of the same type, the hold is
/// converted and must cover the quantity exactly; otherwise the units come
/// from unheld stock.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/purchases \
///   -H "Authorization: Bearer <token>" \
///   -H "X-Session-ID: session_abc" \
///   -H "Idempotency-Key: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "Content-Type: application/json" \
///   -d '{"event_id": "...", "ticket_type_id": "...", "quantity": 2, "order_id": "ord_42"}'
/// ```
///
/// # Errors
///
/// 409 for insufficient stock or a hold quantity mismatch, 403 for another
/// session's hold.
pub async fn purchase(
    Session(ctx): Session,
    State(state): State<AppState>,
    idempotency: Idempotency,
    Json(request): Json<PurchaseRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state.service.purchase(&ctx, request).await?;
            ApiResponse::json(StatusCode::CREATED, &update)
        })
        .await
}

/// Refund sold tickets.
///
/// # Errors
///
/// 403 without refund permission, 422 when refunding more than was sold.
pub async fn refund(
    Session(ctx): Session,
    State(state): State<AppState>,
    idempotency: Idempotency,
    Json(request): Json<RefundRequest>,
) -> Result<ApiResponse, AppError> {
    state
        .idempotency
        .run(&ctx, idempotency, || async {
            let update = state.service.refund(&ctx, request).await?;
            ApiResponse::ok(&update)
        })
        .await
}

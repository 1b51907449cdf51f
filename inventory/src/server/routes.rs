//! Router configuration for the inventory service.

use super::state::AppState;
use crate::api::{bulk, holds, inventory, ledger, purchases};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use boxoffice_web::{correlation_id_layer, handlers};
use tokio::signal;
use tracing::info;

/// Build the complete Axum router.
///
/// - `/health`, `/ready`, `/metrics`: unauthenticated probes
/// - `/api/...`: inventory, holds, sales, ledger and bulk endpoints, all
///   behind a bearer token
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Inventory
        .route("/events/:event_id/inventory", get(inventory::get_inventory))
        .route(
            "/events/:event_id/ticket-types",
            post(inventory::register_ticket_type),
        )
        .route(
            "/events/:event_id/ticket-types/:ticket_type_id/availability",
            get(inventory::get_availability),
        )
        .route("/adjustments", post(inventory::adjust_inventory))
        .route("/sweep", post(inventory::sweep))
        // Holds
        .route("/holds", post(holds::create_hold))
        .route(
            "/holds/:hold_id",
            get(holds::get_hold).put(holds::update_hold),
        )
        .route("/holds/:hold_id/release", post(holds::release_hold))
        .route("/holds/:hold_id/extend", post(holds::extend_hold))
        .route("/holds/:hold_id/timer", get(holds::hold_timer))
        .route("/sessions/:session_id/holds", get(holds::session_holds))
        .route(
            "/sessions/:session_id/release",
            post(holds::release_session_holds),
        )
        // Sales
        .route("/purchases", post(purchases::purchase))
        .route("/refunds", post(purchases::refund))
        // Ledger
        .route("/transactions", get(ledger::list_transactions))
        .route("/alerts", get(ledger::list_alerts))
        .route(
            "/alerts/:alert_id/acknowledge",
            post(ledger::acknowledge_alert),
        )
        // Bulk
        .route("/bulk", post(bulk::submit))
        .route("/bulk/:operation_id", get(bulk::get_operation))
        .route(
            "/events/:event_id/release-expired",
            post(bulk::release_expired),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(correlation_id_layer())
        .with_state(state)
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    handlers::store_readiness(state.service.store())
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.as_ref().and_then(|server| server.render()) {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::NOT_FOUND,
            "Metrics exporter not running".to_string(),
        ),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

//! Box office inventory server.
//!
//! Serves the inventory HTTP API, runs the background hold sweeper and
//! exports Prometheus metrics.
//!
//! # Usage
//!
//! ```bash
//! API_TOKENS="admin-token=ops@example.com:admin,buyer-token=pat@example.com:customer" \
//!   cargo run --bin boxoffice-server
//! ```
//!
//! Set `DATABASE_URL` and build with `--features postgres` to keep the
//! transaction ledger in `PostgreSQL`.

use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_inventory::{
    Config, HoldSweeper, InventoryService, StaticTokenResolver,
    api::IdempotencyCache,
    ledger::{InMemoryTransactionSink, TransactionSink},
    metrics::register_business_metrics,
    server::{AppState, build_router, shutdown_signal},
};
use boxoffice_runtime::metrics::MetricsServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},boxoffice_inventory=debug", config.server.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting box office inventory server");
    info!(
        conflict_policy = %config.inventory.conflict_policy,
        sweep_interval_secs = config.inventory.sweep_interval_secs,
        admins = config.access.admin_emails.len(),
        api_tokens = config.access.api_tokens.len(),
        durable_ledger = config.postgres.is_some(),
        "Configuration loaded"
    );

    // Metrics
    let mut metrics_server = MetricsServer::new(config.metrics_address().parse()?);
    metrics_server.start()?;
    register_business_metrics();
    let metrics_server = Arc::new(metrics_server);

    let sink = ledger_sink(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let service = InventoryService::build(
        clock,
        sink,
        config.inventory.clone(),
        &config.access,
    );
    let resolver = Arc::new(StaticTokenResolver::new(&config.access.api_tokens));
    let idempotency = IdempotencyCache::new(config.inventory.idempotency_ttl());

    // Background sweeper
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweeper = HoldSweeper::new(
        service.clone(),
        config.inventory.sweep_interval(),
        shutdown_tx.subscribe(),
    )
    .spawn();

    let state = AppState::new(service.clone(), resolver, idempotency).with_metrics(metrics_server);
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped; stopping background tasks");
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), sweeper).await.is_err() {
        warn!("Hold sweeper did not stop within 5s");
    }

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    if let Err(error) = service.store().shutdown(timeout).await {
        warn!(error = %error, "Store shutdown incomplete");
    }

    let dead_letters = service.store().dlq().len();
    if dead_letters > 0 {
        warn!(dead_letters, "Ledger entries failed to persist");
    }

    info!("Server stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn ledger_sink(config: &Config) -> Result<Arc<dyn TransactionSink>, Box<dyn std::error::Error>> {
    use boxoffice_inventory::ledger::PostgresTransactionSink;

    if let Some(postgres) = &config.postgres {
        let sink = PostgresTransactionSink::connect(&postgres.url, postgres.max_connections).await?;
        sink.migrate().await?;
        info!("Ledger: PostgreSQL");
        return Ok(Arc::new(sink));
    }
    info!("Ledger: in memory");
    Ok(Arc::new(InMemoryTransactionSink::new()))
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn ledger_sink(config: &Config) -> Result<Arc<dyn TransactionSink>, Box<dyn std::error::Error>> {
    if config.postgres.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled; keeping the ledger in memory");
    }
    info!("Ledger: in memory");
    Ok(Arc::new(InMemoryTransactionSink::new()))
}

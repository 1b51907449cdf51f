//! Configuration for the inventory service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use crate::access::Role;
use crate::availability::StockThresholds;
use crate::conflict::ConflictPolicy;
use crate::types::HoldType;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Hold, stock and conflict rules
    pub inventory: InventoryConfig,
    /// Administrators and API tokens
    pub access: AccessConfig,
    /// Durable ledger; `None` keeps the ledger in memory
    pub postgres: Option<PostgresConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 9090,
            shutdown_timeout: 30,
        }
    }
}

/// Hold durations, stock thresholds and conflict handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Default lifetime of a checkout hold, in minutes
    pub checkout_hold_minutes: u32,
    /// Default lifetime of a cash-payment hold, in minutes
    pub cash_payment_hold_minutes: u32,
    /// Default lifetime of an admin reservation, in minutes
    pub admin_reserve_hold_minutes: u32,
    /// Available quantity at or below which stock is "low"
    pub low_stock_threshold: u32,
    /// Available quantity at or below which stock is "critical"
    pub critical_stock_threshold: u32,
    /// What to do when a hold asks for more than is available
    pub conflict_policy: ConflictPolicy,
    /// How often the background sweeper expires overdue holds, in seconds
    pub sweep_interval_secs: u64,
    /// Largest quantity a single hold may request
    pub max_quantity_per_hold: u32,
    /// How long a request waits for the store to answer, in milliseconds
    pub command_timeout_ms: u64,
    /// How long idempotent responses are replayed, in seconds
    pub idempotency_ttl_secs: u64,
    /// How long finished bulk operations stay queryable, in seconds
    pub bulk_retention_secs: u64,
    /// Most bulk operations remembered at once; the oldest go first
    pub max_bulk_operations: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            checkout_hold_minutes: 15,
            cash_payment_hold_minutes: 240,
            admin_reserve_hold_minutes: 1440,
            low_stock_threshold: 10,
            critical_stock_threshold: 5,
            conflict_policy: ConflictPolicy::PartialFulfill,
            sweep_interval_secs: 60,
            max_quantity_per_hold: 50,
            command_timeout_ms: 5_000,
            idempotency_ttl_secs: 86_400,
            bulk_retention_secs: 86_400,
            max_bulk_operations: 1_000,
        }
    }
}

impl InventoryConfig {
    /// Default lifetime for a hold category, in minutes
    #[must_use]
    pub const fn default_hold_minutes(&self, hold_type: HoldType) -> u32 {
        match hold_type {
            HoldType::Checkout => self.checkout_hold_minutes,
            HoldType::CashPayment => self.cash_payment_hold_minutes,
            HoldType::AdminReserve => self.admin_reserve_hold_minutes,
        }
    }

    /// Low and critical stock thresholds
    #[must_use]
    pub const fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            low: self.low_stock_threshold,
            critical: self.critical_stock_threshold,
        }
    }

    /// Background sweep interval
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Store round-trip timeout
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Idempotency replay window
    #[must_use]
    pub const fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    /// Retention window for finished bulk operations
    #[must_use]
    pub const fn bulk_retention(&self) -> Duration {
        Duration::from_secs(self.bulk_retention_secs)
    }
}

/// Administrators and static API tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Emails that always resolve to the administrator role
    pub admin_emails: Vec<String>,
    /// Bearer tokens accepted by the static token resolver
    pub api_tokens: Vec<ApiTokenConfig>,
}

/// One static bearer token and the identity it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTokenConfig {
    /// Bearer token value
    pub token: String,
    /// Email of the identity
    pub email: String,
    /// Roles of the identity
    pub roles: Vec<Role>,
}

impl FromStr for ApiTokenConfig {
    type Err = String;

    /// Parses `token=email:role|role`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, identity) = s
            .split_once('=')
            .ok_or_else(|| format!("expected token=email:roles, got {s:?}"))?;
        let (email, roles) = identity.split_once(':').unwrap_or((identity, ""));

        let roles = roles
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Role>, _>>()?;

        let token = token.trim();
        let email = email.trim();
        if token.is_empty() || email.is_empty() {
            return Err(format!("token and email must not be empty in {s:?}"));
        }

        Ok(Self {
            token: token.to_string(),
            email: email.to_string(),
            roles,
        })
    }
}

/// `PostgreSQL` configuration for the durable ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to defaults; malformed API
    /// token entries are skipped with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let server = ServerConfig::default();
        let inventory = InventoryConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(server.host),
                port: parsed("SERVER_PORT").unwrap_or(server.port),
                log_level: env::var("LOG_LEVEL").unwrap_or(server.log_level),
                metrics_host: env::var("METRICS_HOST").unwrap_or(server.metrics_host),
                metrics_port: parsed("METRICS_PORT").unwrap_or(server.metrics_port),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT").unwrap_or(server.shutdown_timeout),
            },
            inventory: InventoryConfig {
                checkout_hold_minutes: parsed("HOLD_CHECKOUT_MINUTES")
                    .unwrap_or(inventory.checkout_hold_minutes),
                cash_payment_hold_minutes: parsed("HOLD_CASH_PAYMENT_MINUTES")
                    .unwrap_or(inventory.cash_payment_hold_minutes),
                admin_reserve_hold_minutes: parsed("HOLD_ADMIN_RESERVE_MINUTES")
                    .unwrap_or(inventory.admin_reserve_hold_minutes),
                low_stock_threshold: parsed("LOW_STOCK_THRESHOLD")
                    .unwrap_or(inventory.low_stock_threshold),
                critical_stock_threshold: parsed("CRITICAL_STOCK_THRESHOLD")
                    .unwrap_or(inventory.critical_stock_threshold),
                conflict_policy: parsed("CONFLICT_POLICY").unwrap_or(inventory.conflict_policy),
                sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")
                    .unwrap_or(inventory.sweep_interval_secs),
                max_quantity_per_hold: parsed("MAX_QUANTITY_PER_HOLD")
                    .unwrap_or(inventory.max_quantity_per_hold),
                command_timeout_ms: parsed("COMMAND_TIMEOUT_MS")
                    .unwrap_or(inventory.command_timeout_ms),
                idempotency_ttl_secs: parsed("IDEMPOTENCY_TTL_SECS")
                    .unwrap_or(inventory.idempotency_ttl_secs),
                bulk_retention_secs: parsed("BULK_RETENTION_SECS")
                    .unwrap_or(inventory.bulk_retention_secs),
                max_bulk_operations: parsed("MAX_BULK_OPERATIONS")
                    .unwrap_or(inventory.max_bulk_operations),
            },
            access: AccessConfig {
                admin_emails: list("ADMIN_EMAILS"),
                api_tokens: list("API_TOKENS")
                    .into_iter()
                    .filter_map(|entry| match entry.parse() {
                        Ok(token) => Some(token),
                        Err(error) => {
                            tracing::warn!(error = %error, "Skipping malformed API_TOKENS entry");
                            None
                        },
                    })
                    .collect(),
            },
            postgres: env::var("DATABASE_URL").ok().map(|url| PostgresConfig {
                url,
                max_connections: parsed("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            }),
        }
    }

    /// Address the HTTP server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Address the Prometheus exporter binds to
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

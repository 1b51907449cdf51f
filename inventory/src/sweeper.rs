//! Background expiry of overdue holds.
//!
//! Lazy expiry already reclaims stock whenever a ticket type is touched. The
//! sweeper makes expiry visible for ticket types nobody is touching, so the
//! ledger and alerts do not wait for the next request.

use crate::service::InventoryService;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic sweep task.
pub struct HoldSweeper {
    service: InventoryService,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl HoldSweeper {
    /// Sweeper running every `interval` until `shutdown` fires.
    #[must_use]
    pub const fn new(
        service: InventoryService,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            service,
            interval,
            shutdown,
        }
    }

    /// Run one sweep, returning how many holds expired.
    pub async fn sweep_once(&self) -> usize {
        match self.service.sweep_expired(None).await {
            Ok(update) => {
                let expired = update.affected_holds.len();
                if expired > 0 {
                    info!(expired, "Sweeper expired overdue holds");
                } else {
                    debug!("Sweeper found no overdue holds");
                }
                expired
            },
            Err(error) => {
                warn!(error = %error, "Sweep failed; retrying next interval");
                0
            },
        }
    }

    /// Start the loop on the runtime.
    #[must_use]
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "Hold sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                    _ = self.shutdown.recv() => {
                        info!("Hold sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

//! Countdown for a hold's remaining lifetime.
//!
//! The timer is presentation only: it never changes inventory. Expiry is
//! decided by the reducer (lazy expiry and the background sweeper). The
//! `on_expired` callback is a client-local signal that fires once.

use crate::types::{Hold, HoldId};
use boxoffice_core::environment::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Remaining time at or below which the timer shows a warning
pub const WARNING_THRESHOLD_MS: u64 = 5 * 60 * 1000;

/// Remaining time at or below which the timer is critical
pub const CRITICAL_THRESHOLD_MS: u64 = 60 * 1000;

/// Title shown once the hold is gone
pub const EXPIRED_TITLE: &str = "Hold Expired";

/// Title shown while time remains
pub const ACTIVE_TITLE: &str = "Time Remaining";

/// Prominent notice shown once the hold is gone
pub const EXPIRED_NOTICE: &str = "Your ticket hold has expired. Please start over.";

const TICK: Duration = Duration::from_secs(1);

/// How close a hold is to expiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// More than five minutes left
    Normal,
    /// Five minutes or less
    Warning,
    /// One minute or less
    Critical,
    /// No time left
    Expired,
}

impl Urgency {
    /// Classify a remaining duration in milliseconds
    #[must_use]
    pub const fn for_remaining(remaining_ms: u64) -> Self {
        if remaining_ms == 0 {
            Self::Expired
        } else if remaining_ms <= CRITICAL_THRESHOLD_MS {
            Self::Critical
        } else if remaining_ms <= WARNING_THRESHOLD_MS {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// Milliseconds from `now` until `expires_at`, clamped at zero.
#[must_use]
pub fn remaining_ms(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((expires_at - now).num_milliseconds()).unwrap_or(0)
}

/// `m:ss` rendering of a duration in milliseconds.
#[must_use]
pub fn format_remaining(remaining_ms: u64) -> String {
    let total_seconds = remaining_ms / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// What a countdown shows at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Hold being counted down
    pub hold_id: HoldId,
    /// When the hold expires
    pub expires_at: DateTime<Utc>,
    /// Milliseconds left, never negative
    pub remaining_ms: u64,
    /// `m:ss`
    pub formatted: String,
    /// Urgency level
    pub urgency: Urgency,
    /// Heading for prominent display
    pub title: String,
    /// Short status line
    pub message: String,
    /// Whether an extension may still be requested
    pub can_extend: bool,
}

impl TimerSnapshot {
    /// Snapshot of a countdown towards `expires_at`.
    #[must_use]
    pub fn at(hold_id: HoldId, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining_ms = remaining_ms(expires_at, now);
        let formatted = format_remaining(remaining_ms);
        let urgency = Urgency::for_remaining(remaining_ms);
        let message = match urgency {
            Urgency::Expired => "Time expired".to_string(),
            Urgency::Critical => format!("⚠️ {formatted} left!"),
            Urgency::Warning | Urgency::Normal => format!("{formatted} remaining"),
        };
        let title = if urgency == Urgency::Expired {
            EXPIRED_TITLE
        } else {
            ACTIVE_TITLE
        };

        Self {
            hold_id,
            expires_at,
            remaining_ms,
            formatted,
            urgency,
            title: title.to_string(),
            message,
            can_extend: urgency != Urgency::Expired,
        }
    }

    /// Snapshot for a hold, `None` when it never expires.
    #[must_use]
    pub fn for_hold(hold: &Hold, now: DateTime<Utc>) -> Option<Self> {
        hold.expires_at
            .map(|expires_at| Self::at(hold.id, expires_at, now))
    }

    /// Whether the countdown reached zero
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.urgency == Urgency::Expired
    }

    /// Body text for prominent display
    #[must_use]
    pub fn notice(&self) -> &str {
        if self.is_expired() {
            EXPIRED_NOTICE
        } else {
            &self.message
        }
    }
}

/// Countdown over several holds, driven by the one that expires first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSummary {
    /// Number of holds with an expiry
    pub active_holds: usize,
    /// Heading, e.g. "3 Active Holds"
    pub headline: String,
    /// Countdown of the soonest-expiring hold
    pub soonest: TimerSnapshot,
}

/// Summary of the soonest-expiring hold. `None` when no hold expires.
#[must_use]
pub fn soonest(holds: &[Hold], now: DateTime<Utc>) -> Option<TimerSummary> {
    let timed: Vec<(&Hold, DateTime<Utc>)> = holds
        .iter()
        .filter_map(|hold| hold.expires_at.map(|at| (hold, at)))
        .collect();
    let (hold, expires_at) = timed.iter().min_by_key(|(_, at)| *at)?;

    let headline = if timed.len() == 1 {
        ACTIVE_TITLE.to_string()
    } else {
        format!("{} Active Holds", timed.len())
    };

    Some(TimerSummary {
        active_holds: timed.len(),
        headline,
        soonest: TimerSnapshot::at(hold.id, *expires_at, now),
    })
}

/// Ticking countdown for one hold.
pub struct HoldTimer {
    hold_id: HoldId,
    expires_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    expired_signalled: bool,
}

impl HoldTimer {
    /// Timer for `hold`, `None` when it never expires.
    #[must_use]
    pub fn new(hold: &Hold, clock: Arc<dyn Clock>) -> Option<Self> {
        hold.expires_at.map(|expires_at| Self {
            hold_id: hold.id,
            expires_at,
            clock,
            expired_signalled: false,
        })
    }

    /// Current countdown
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::at(self.hold_id, self.expires_at, self.clock.now())
    }

    /// Whether an extension may still be requested
    #[must_use]
    pub fn can_extend(&self) -> bool {
        self.clock.now() < self.expires_at
    }

    /// Follow a new expiry after the hold was extended.
    pub fn extended_to(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = expires_at;
        if self.clock.now() < expires_at {
            self.expired_signalled = false;
        }
    }

    /// Take one reading. The flag is `true` only on the first reading at or
    /// after expiry.
    pub fn poll(&mut self) -> (TimerSnapshot, bool) {
        let snapshot = self.snapshot();
        let first_expiry = snapshot.is_expired() && !self.expired_signalled;
        if first_expiry {
            self.expired_signalled = true;
        }
        (snapshot, first_expiry)
    }

    /// Tick once per second until the hold expires.
    ///
    /// `on_tick` sees every reading, the final expired one included;
    /// `on_expired` runs once, then the task ends.
    pub fn spawn<T, X>(mut self, mut on_tick: T, on_expired: X) -> JoinHandle<()>
    where
        T: FnMut(&TimerSnapshot) + Send + 'static,
        X: FnOnce(HoldId) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                let (snapshot, first_expiry) = self.poll();
                on_tick(&snapshot);
                if first_expiry {
                    tracing::debug!(hold_id = %self.hold_id, "Hold timer reached zero");
                    on_expired(self.hold_id);
                    break;
                }
            }
        })
    }
}

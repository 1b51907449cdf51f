//! Retry logic with exponential backoff for effects that talk to the outside
//! world (durable ledger writes, notifications).
//!
//! Operations that still fail after the last attempt are recorded in a
//! [`DeadLetterQueue`] so they can be inspected and replayed by an operator.
//!
//! # Example
//!
//! ```rust,ignore
//! use boxoffice_runtime::{DeadLetterQueue, RetryPolicy, retry_or_dead_letter};
//!
//! let dlq = DeadLetterQueue::new(100);
//! let written = retry_or_dead_letter(&RetryPolicy::default(), &dlq, "ledger_append", || async {
//!     sink.append(&entries).await
//! })
//! .await;
//! ```

use crate::DeadLetterQueue;
use std::time::Duration;

/// Retry policy for handling transient failures
///
/// Exponential backoff with jitter. Defaults:
/// - `max_attempts`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 5 seconds
/// - `backoff_multiplier`: 2.0
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a new retry policy with default settings
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Set maximum attempts (including the first one)
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay before first retry
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between retries
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate delay for a given attempt number (0-indexed)
    ///
    /// `delay = min(initial_delay * multiplier^attempt, max_delay) * (0.5 + random(0.5))`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        #[allow(clippy::cast_possible_wrap)]
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_secs = base_delay_secs.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);

        Duration::from_secs_f64(capped_secs * jitter)
    }

    /// Get maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check if we should retry based on attempt number
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `operation` until it succeeds or the policy is exhausted
///
/// On exhaustion the operation name and last error are pushed onto `dlq`.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn retry_or_dead_letter<F, Fut, T, Err>(
    policy: &RetryPolicy,
    dlq: &DeadLetterQueue<String>,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Err>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Err>>,
    Err: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    metrics::counter!(
                        "store.retry.success",
                        "operation" => operation_name.to_string()
                    )
                    .increment(1);
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            },
            Err(error) => {
                if !policy.should_retry(attempt + 1) {
                    dlq.push(
                        operation_name.to_string(),
                        error.to_string(),
                        (attempt + 1) as usize,
                    );
                    metrics::counter!(
                        "store.retry.exhausted",
                        "operation" => operation_name.to_string()
                    )
                    .increment(1);
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %error,
                        "Operation failed after exhausting retries, added to DLQ"
                    );
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Operation failed, retrying after delay"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[test]
    fn delay_is_capped_and_jittered() {
        let policy = RetryPolicy::new().with_max_delay(Duration::from_millis(300));
        for attempt in 0..10 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= Duration::from_millis(300));
        }
        let first = policy.delay_for_attempt(0);
        assert!(first >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let dlq = DeadLetterQueue::new(10);
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_or_dead_letter(&fast_policy(3), &dlq, "ledger_append", || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection reset")
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn exhausted_operation_lands_in_dead_letter_queue() {
        let dlq = DeadLetterQueue::new(10);

        let result: Result<(), &str> =
            retry_or_dead_letter(&fast_policy(2), &dlq, "ledger_append", || async {
                Err("database unavailable")
            })
            .await;

        assert!(result.is_err());
        let entries = dlq.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload, "ledger_append");
        assert_eq!(entries[0].retry_count, 2);
        assert_eq!(entries[0].error_message, "database unavailable");
    }
}

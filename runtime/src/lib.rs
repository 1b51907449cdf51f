//! # Boxoffice Runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! The Store is the serialization point of the service: every action is
//! reduced while holding the exclusive state lock, so a check-and-mutate
//! inside a reducer is atomic with respect to every other action. Effects run
//! afterwards on spawned tasks and never hold the lock.
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_runtime::Store;
//!
//! let store = Store::new(initial_state, reducer, environment);
//!
//! store.send(Action::DoSomething).await?;
//! let value = store.state(|s| s.some_field).await;
//! ```

use boxoffice_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics exporter
pub mod metrics;

pub use retry::{RetryPolicy, retry_or_dead_letter};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// An effect execution failed
        #[error("Effect execution failed: {0}")]
        EffectFailed(String),

        /// A spawned effect task panicked or was cancelled
        #[error("Task failed during effect execution: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

// ============================================================================
// Health
// ============================================================================

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues (e.g., high DLQ size)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Optional metadata (e.g., queue sizes)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

// ============================================================================
// Dead letter queue
// ============================================================================

/// Dead letter queue entry
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// The failed operation payload
    pub payload: T,

    /// Number of attempts made before giving up
    pub retry_count: usize,

    /// The error message from the last failure
    pub error_message: String,

    /// When the entry was recorded
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Bounded queue of operations that failed after exhausting retries
///
/// Oldest entries are dropped when the queue is full. Clones share storage.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue with the given max size
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size,
        }
    }

    /// Push a failed operation onto the queue
    ///
    /// If the queue is full, the oldest entry is dropped.
    pub fn push(&self, payload: T, error_message: String, retry_count: usize) {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            ::metrics::counter!("dlq.dropped").increment(1);
            tracing::warn!(
                max_size = self.max_size,
                "DLQ at capacity, dropping oldest entry"
            );
        }

        queue.push_back(DeadLetter {
            payload,
            retry_count,
            error_message,
            failed_at: chrono::Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        ::metrics::gauge!("dlq.size").set(queue.len() as f64);
        ::metrics::counter!("dlq.pushed").increment(1);

        tracing::warn!(
            retry_count,
            queue_size = queue.len(),
            "Operation added to dead letter queue"
        );
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all entries from the queue
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        ::metrics::gauge!("dlq.size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for Store instances
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Dead letter queue shared with the effects that report into it
    pub dlq: DeadLetterQueue<String>,
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Share an existing dead letter queue with the store
    #[must_use]
    pub fn with_dlq(mut self, dlq: DeadLetterQueue<String>) -> Self {
        self.dlq = dlq;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dlq: DeadLetterQueue::default(),
            broadcast_capacity: 256,
        }
    }
}

// ============================================================================
// Effect tracking
// ============================================================================

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] so callers can wait until the effects
/// spawned for their action have finished.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Decrements the effect counter on drop, even if the effect panics
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Decrements the store-wide pending counter on drop (shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Store
// ============================================================================

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DeadLetterQueue, DecrementGuard,
        Duration, Effect, EffectHandle, EffectTracking, HealthCheck, Ordering, Reducer, RwLock,
        StoreConfig, StoreError,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; the reducer runs under the write lock)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        dlq: DeadLetterQueue<String>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects are broadcast to observers before being
        /// fed back into the reducer.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                dlq: config.dlq,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Get access to the dead letter queue
        #[must_use]
        pub fn dlq(&self) -> DeadLetterQueue<String> {
            self.dlq.clone()
        }

        /// Whether shutdown has been initiated
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Perform a health check on the Store
        ///
        /// Degraded when the dead letter queue is more than half full, unhealthy
        /// when it is full or the store is shutting down.
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let dlq_size = self.dlq.len();
            let dlq_capacity = self.dlq.max_size().max(1);
            #[allow(clippy::cast_precision_loss)]
            let dlq_usage = (dlq_size as f64 / dlq_capacity as f64) * 100.0;

            let check = if self.is_shutting_down() {
                HealthCheck::unhealthy("store", "Store is shutting down")
            } else if dlq_size >= dlq_capacity {
                HealthCheck::unhealthy("store", "Dead letter queue is full")
            } else if dlq_usage > 50.0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let usage_pct = dlq_usage as u32;
                HealthCheck::degraded("store", format!("Dead letter queue is {usage_pct}% full"))
            } else {
                HealthCheck::healthy("store")
            };

            check
                .with_metadata("dlq_size", dlq_size.to_string())
                .with_metadata("dlq_capacity", dlq_capacity.to_string())
                .with_metadata(
                    "pending_effects",
                    self.pending_effects.load(Ordering::Acquire).to_string(),
                )
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Sets the shutdown flag (rejecting new actions) and waits for pending
        /// effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(50);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Releases the lock and starts the returned effects
        ///
        /// Concurrent `send()` calls serialize at the reducer. `send()` returns
        /// once effects have been started, not when they complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.is_shutting_down() {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                effects
            };

            tracing::trace!("Reducer completed, returned {} effects", effects.len());
            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action produced by its effects
        ///
        /// Subscribes to the action broadcast before sending, so a result
        /// emitted immediately by an effect cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before the timeout
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let hold_count = store.state(|s| s.holds.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        fn track_spawn(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }

        /// Broadcast an effect-produced action, then feed it back into the reducer
        async fn feed_back(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            let _ = self.action_broadcast.send(action.clone());
            if let Err(error) = self.send(action).await {
                tracing::debug!(error = %error, "Feedback action not reduced");
            }
        }

        #[allow(clippy::needless_pass_by_value)]
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guards = self.track_spawn(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                dlq: self.dlq.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use boxoffice_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Increment,
        IncrementLater,
        Incremented { value: u32 },
    }

    #[derive(Debug, Default)]
    struct CounterState {
        value: u32,
        observed: Vec<u32>,
    }

    #[derive(Clone)]
    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut CounterState,
            action: CounterAction,
            _env: &(),
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Increment => {
                    state.value += 1;
                    let value = state.value;
                    smallvec![Effect::Future(Box::pin(async move {
                        Some(CounterAction::Incremented { value })
                    }))]
                },
                CounterAction::IncrementLater => smallvec![Effect::Future(Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Some(CounterAction::Increment)
                }))],
                CounterAction::Incremented { value } => {
                    state.observed.push(value);
                    SmallVec::new()
                },
            }
        }
    }

    fn store() -> Store<CounterState, CounterAction, (), CounterReducer> {
        Store::new(CounterState::default(), CounterReducer, ())
    }

    #[tokio::test]
    async fn send_runs_reducer_and_feeds_back_effect_actions() {
        let store = store();
        let mut handle = store.send(CounterAction::Increment).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(store.state(|s| s.observed.clone()).await, vec![1]);
    }

    #[tokio::test]
    async fn send_and_wait_for_returns_matching_action() {
        let store = store();
        let result = store
            .send_and_wait_for(
                CounterAction::IncrementLater,
                |a| matches!(a, CounterAction::Incremented { .. }),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(result, CounterAction::Incremented { value: 1 });
    }

    #[tokio::test]
    async fn send_and_wait_for_times_out_without_match() {
        let store = store();
        let result = store
            .send_and_wait_for(
                CounterAction::Incremented { value: 9 },
                |_| true,
                Duration::from_millis(20),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn concurrent_sends_are_serialized() {
        let store = store();
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.send(CounterAction::Increment).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.state(|s| s.value).await, 50);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(CounterAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(store.health().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn health_degrades_as_dead_letter_queue_fills() {
        let dlq = DeadLetterQueue::new(4);
        let store = Store::with_config(
            CounterState::default(),
            CounterReducer,
            (),
            StoreConfig::default().with_dlq(dlq.clone()),
        );
        assert!(store.health().status.is_healthy());

        for n in 0..3 {
            dlq.push(format!("ledger-{n}"), "connection refused".to_string(), 3);
        }
        assert_eq!(store.health().status, HealthStatus::Degraded);

        dlq.push("ledger-3".to_string(), "connection refused".to_string(), 3);
        assert_eq!(store.health().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn dead_letter_queue_drops_oldest_when_full() {
        let dlq = DeadLetterQueue::new(2);
        dlq.push("a", "e".to_string(), 1);
        dlq.push("b", "e".to_string(), 1);
        dlq.push("c", "e".to_string(), 1);

        let entries: Vec<_> = dlq.drain().into_iter().map(|e| e.payload).collect();
        assert_eq!(entries, vec!["b", "c"]);
        assert!(dlq.is_empty());
    }
}

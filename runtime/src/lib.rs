//! # Box Office Runtime
//!
//! Runtime for the box-office seat engine.
//!
//! This crate provides the [`Store`], the single writer of engine state:
//!
//! - **Store**: owns the state behind one `RwLock` and runs the reducer for
//!   exactly one action at a time
//! - **Effect Executor**: executes effect descriptions and feeds resulting
//!   actions back into the reducer
//! - **Timer Table**: keyed, cancellable timers (`Effect::Schedule` /
//!   `Effect::Cancel`), at most one pending timer per id
//!
//! ## Example
//!
//! ```ignore
//! use box_office_runtime::Store;
//!
//! let store = Store::new(initial_state, reducer, environment);
//!
//! store.send(SeatingAction::AddSeat { class }).await?;
//! let selected = store.state(|s| s.current_selection(&class)).await;
//! ```

use box_office_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Prometheus metrics for the runtime
pub mod metrics;

/// Keyed timer bookkeeping
mod timers;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Actions fed back by effects that are still running are accepted.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use timers::TimerTable;
use tokio::sync::watch;

/// RAII guard that decrements a pending counter on drop and wakes waiters.
///
/// Ensures the counter is updated even if the effect panics or its task is
/// aborted (cancelled timers drop their future, and with it the guard).
struct PendingGuard {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>, notifier: &Arc<watch::Sender<()>>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
            notifier: Arc::clone(notifier),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, Duration, Effect, Ordering, PendingGuard, Reducer, RwLock,
        StoreError, TimerTable,
    };
    use tokio::sync::{broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`, written only by the reducer)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and keyed timers)
    ///
    /// Every mutation happens inside [`Store::send`] while the write lock is
    /// held, so no action ever observes another action half-applied.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        timers: Arc<TimerTable>,
        shutdown: Arc<AtomicBool>,
        /// Every spawned effect, timers included (used by shutdown)
        pending_effects: Arc<AtomicUsize>,
        /// Spawned effects that are not timers (used by `settle`)
        running_work: Arc<AtomicUsize>,
        work_notifier: Arc<watch::Sender<()>>,
        effect_notifier: Arc<watch::Sender<()>>,
        /// Broadcast of every action produced by effects
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast channel buffers 64 actions.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity when slow observers (e.g. a redraw loop)
        /// frequently lag behind bulk marking.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity);
            let (work_notifier, _) = watch::channel(());
            let (effect_notifier, _) = watch::channel(());

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                timers: Arc::new(TimerTable::default()),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                running_work: Arc::new(AtomicUsize::new(0)),
                work_notifier: Arc::new(work_notifier),
                effect_notifier: Arc::new(effect_notifier),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Starts executing the returned effects
        ///
        /// `send()` returns once the reducer has run and its effects have been
        /// started, not when they complete. Use [`Store::settle`] to wait for
        /// remote calls and their feedback actions.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            self.dispatch(action).await;
            Ok(())
        }

        /// Run the reducer for one action and start its effects.
        ///
        /// Used for external sends and for feedback from effects; feedback is
        /// accepted during shutdown so in-flight work can still resolve.
        async fn dispatch(&self, action: A) {
            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect);
            }
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let pending = store.state(|s| s.sync.pending_len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Timer deliveries and remote-call results are broadcast before they
        /// are reduced. Actions sent directly via [`Store::send`] are not.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Number of keyed timers currently pending
        #[must_use]
        pub fn pending_timers(&self) -> usize {
            self.timers.len()
        }

        /// Wait until every non-timer effect, and everything it fed back, has
        /// completed.
        ///
        /// Pending timers are not waited for.
        pub async fn settle(&self) {
            let mut rx = self.work_notifier.subscribe();
            while self.running_work.load(Ordering::SeqCst) > 0 {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        /// Initiate graceful shutdown of the store
        ///
        /// 1. Sets the shutdown flag (rejecting new external actions)
        /// 2. Waits for pending effects (timers included) to complete
        ///
        /// Callers that must not wait for timers should dispatch an action that
        /// cancels them first (the seating reducer's teardown does).
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before
        /// all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let mut rx = self.effect_notifier.subscribe();
            let wait = async {
                while self.pending_effects.load(Ordering::SeqCst) > 0 {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if tokio::time::timeout(timeout, wait).await.is_ok() {
                tracing::info!("All effects completed, shutdown successful");
                metrics::counter!("store.shutdown.completed").increment(1);
                Ok(())
            } else {
                let pending = self.pending_effects.load(Ordering::SeqCst);
                tracing::error!(
                    pending_effects = pending,
                    "Shutdown timeout: {} effects still running",
                    pending
                );
                metrics::counter!("store.shutdown.timeout").increment(1);
                Err(StoreError::ShutdownTimeout(pending))
            }
        }

        fn pending_guard(&self) -> PendingGuard {
            PendingGuard::new(&self.pending_effects, &self.effect_notifier)
        }

        fn work_guard(&self) -> PendingGuard {
            PendingGuard::new(&self.running_work, &self.work_notifier)
        }

        /// Broadcast an effect-produced action and reduce it.
        async fn feed_back(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());
            self.dispatch(action).await;
        }

        /// Execute an effect
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, feeds the resulting action back
        /// - `Schedule`: Waits for duration, then feeds the action back; replaces
        ///   a pending timer with the same id
        /// - `Cancel`: Aborts the pending timer with the id, dropping its action
        /// - `Parallel`: Executes effects concurrently
        #[allow(clippy::cognitive_complexity)]
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    let pending_guard = self.pending_guard();
                    let work_guard = self.work_guard();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _pending_guard = pending_guard;
                        let _work_guard = work_guard;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feed_back(action).await;
                        } else {
                            tracing::trace!("Effect::Future completed with no action");
                        }
                    });
                },
                Effect::Schedule {
                    id,
                    duration,
                    action,
                } => {
                    tracing::trace!(timer = %id, ?duration, "Executing Effect::Schedule");
                    metrics::counter!("store.effects.executed", "type" => "schedule").increment(1);

                    let generation = self.timers.next_generation();
                    if self.timers.reserve(id, generation) {
                        tracing::trace!(timer = %id, "Replaced pending timer");
                        metrics::counter!("store.timers.replaced").increment(1);
                    }

                    let pending_guard = self.pending_guard();
                    let store = self.clone();

                    let task = tokio::spawn(async move {
                        let _pending_guard = pending_guard;
                        tokio::time::sleep(duration).await;

                        if store.timers.complete(id, generation) {
                            tracing::trace!(timer = %id, "Timer fired, sending action");
                            store.feed_back(*action).await;
                        }
                    });
                    self.timers.attach(id, generation, task.abort_handle());
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    if self.timers.cancel(id) {
                        tracing::trace!(timer = %id, "Cancelled pending timer");
                        metrics::counter!("store.timers.cancelled").increment(1);
                    }
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);

                    for effect in effects {
                        self.execute_effect(effect);
                    }
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
                timers: Arc::clone(&self.timers),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                running_work: Arc::clone(&self.running_work),
                work_notifier: Arc::clone(&self.work_notifier),
                effect_notifier: Arc::clone(&self.effect_notifier),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use box_office_core::effect::TimerId;
    use box_office_core::{SmallVec, cancel, schedule, smallvec};

    const TICK: TimerId = TimerId::new("test.tick");

    #[derive(Clone, Debug, Default)]
    struct TickState {
        fired: Vec<u32>,
    }

    #[derive(Clone, Debug)]
    enum TickAction {
        Arm { token: u32, after_ms: u64 },
        Disarm,
        Fired { token: u32 },
        Fetch { token: u32 },
    }

    #[derive(Clone)]
    struct TickReducer;

    impl Reducer for TickReducer {
        type State = TickState;
        type Action = TickAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TickState,
            action: TickAction,
            _env: &(),
        ) -> SmallVec<[Effect<TickAction>; 4]> {
            match action {
                TickAction::Arm { token, after_ms } => smallvec![schedule! {
                    id: TICK,
                    after: Duration::from_millis(after_ms),
                    action: TickAction::Fired { token }
                }],
                TickAction::Disarm => smallvec![cancel!(TICK)],
                TickAction::Fired { token } => {
                    state.fired.push(token);
                    smallvec![Effect::None]
                },
                TickAction::Fetch { token } => {
                    smallvec![box_office_core::async_effect! {
                        Some(TickAction::Fired { token })
                    }]
                },
            }
        }
    }

    fn store() -> Store<TickState, TickAction, (), TickReducer> {
        Store::new(TickState::default(), TickReducer, ())
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_a_timer_replaces_the_pending_one() {
        let store = store();
        store.send(TickAction::Arm { token: 1, after_ms: 500 }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        store.send(TickAction::Arm { token: 2, after_ms: 500 }).await.unwrap();
        assert_eq!(store.pending_timers(), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.state(|s| s.fired.clone()).await.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.state(|s| s.fired.clone()).await, vec![2]);
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let store = store();
        store.send(TickAction::Arm { token: 1, after_ms: 300 }).await.unwrap();
        store.send(TickAction::Disarm).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(store.state(|s| s.fired.clone()).await.is_empty());
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test]
    async fn settle_waits_for_future_feedback() {
        let store = store();
        store.send(TickAction::Fetch { token: 7 }).await.unwrap();
        store.settle().await;
        assert_eq!(store.state(|s| s.fired.clone()).await, vec![7]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        let result = store.send(TickAction::Disarm).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_times_out_on_pending_timer() {
        let store = store();
        store.send(TickAction::Arm { token: 1, after_ms: 60_000 }).await.unwrap();
        let result = store.shutdown(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
    }
}

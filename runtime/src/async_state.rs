//! Loading/error/staleness bookkeeping around a single async operation.
//!
//! An [`AsyncSlot`] holds the [`AsyncState`] of one logical operation (a list
//! fetch, a create, the update of one entity, ...). [`with_async_state`] runs
//! an operation against a slot:
//!
//! 1. mark the slot loading and clear its error
//! 2. apply the optimistic mutation, if any
//! 3. await the operation, then record success or failure
//! 4. roll back the optimistic mutation on failure
//! 5. run exactly one of `on_success` / `on_error`, then `on_finally`
//!
//! The tracker never retries. `retry_count` is bookkeeping that callers may
//! use to decide whether to run the operation again.
//!
//! # Example
//!
//! ```
//! use catalog_store_core::environment::SystemClock;
//! use catalog_store_runtime::async_state::{with_async_state, AsyncOptions, AsyncSlot};
//!
//! # async fn example() {
//! let slot: AsyncSlot<String> = AsyncSlot::new();
//!
//! let result = with_async_state(
//!     &slot,
//!     &SystemClock,
//!     || async { Ok::<_, String>(42) },
//!     AsyncOptions::new().on_success_sync(|value: &i32| assert_eq!(*value, 42)),
//! )
//! .await;
//!
//! assert_eq!(result, Ok(42));
//! assert!(!slot.is_loading());
//! assert!(slot.last_fetch().is_some());
//! # }
//! ```

use crate::metrics::AsyncStateMetrics;
use catalog_store_core::environment::Clock;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default staleness threshold (5 minutes)
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Bookkeeping for one logical async operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncState<E> {
    /// True strictly between operation start and settlement
    pub loading: bool,
    /// Last failure, cleared when an operation starts
    pub error: Option<E>,
    /// Time of the last successful settlement
    pub last_fetch: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success or reset
    pub retry_count: u32,
}

impl<E> AsyncState<E> {
    /// Initial state: idle, no error, never fetched
    #[must_use]
    pub const fn new() -> Self {
        Self {
            loading: false,
            error: None,
            last_fetch: None,
            retry_count: 0,
        }
    }

    /// Whether the last successful settlement is older than `stale_time`.
    ///
    /// A state that never succeeded is always stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        let Some(last_fetch) = self.last_fetch else {
            return true;
        };

        // A threshold too large for chrono can never be exceeded
        chrono::Duration::from_std(stale_time)
            .is_ok_and(|limit| now.signed_duration_since(last_fetch) > limit)
    }

    /// Reinitialise every field to its creation default
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<E> Default for AsyncState<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `state` needs a refetch at time `now`.
///
/// See [`AsyncState::is_stale`].
#[must_use]
pub fn is_stale<E>(state: &AsyncState<E>, now: DateTime<Utc>, stale_time: Duration) -> bool {
    state.is_stale(now, stale_time)
}

/// Shared handle to the [`AsyncState`] of one operation slot.
///
/// Cloning the handle shares the state. The inner lock is only held for
/// synchronous reads and writes, never across an `.await`, so the state is
/// observable while the operation is suspended.
#[derive(Debug)]
pub struct AsyncSlot<E> {
    state: Arc<Mutex<AsyncState<E>>>,
}

impl<E> AsyncSlot<E> {
    /// Create a slot in the initial state
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AsyncState::new())),
        }
    }

    /// Run `f` with exclusive access to the state
    pub fn update<R>(&self, f: impl FnOnce(&mut AsyncState<E>) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Read through the state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&AsyncState<E>) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> AsyncState<E>
    where
        E: Clone,
    {
        self.read(Clone::clone)
    }

    /// Whether an operation is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.read(|state| state.loading)
    }

    /// Last failure, if any
    #[must_use]
    pub fn error(&self) -> Option<E>
    where
        E: Clone,
    {
        self.read(|state| state.error.clone())
    }

    /// Time of the last successful settlement
    #[must_use]
    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.read(|state| state.last_fetch)
    }

    /// Consecutive failures since the last success or reset
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.read(|state| state.retry_count)
    }

    /// Whether the slot needs a refetch according to `clock`
    #[must_use]
    pub fn is_stale(&self, clock: &dyn Clock, stale_time: Duration) -> bool {
        let now = clock.now();
        self.read(|state| state.is_stale(now, stale_time))
    }

    /// Forget the last successful settlement so the next check is stale
    pub fn invalidate(&self) {
        self.update(|state| state.last_fetch = None);
    }

    /// Reinitialise the state in place
    pub fn reset(&self) {
        self.update(AsyncState::reset);
    }
}

impl<E> Clone for AsyncSlot<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> Default for AsyncSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reinitialise all four fields of `slot` in place.
pub fn reset_async_state<E>(slot: &AsyncSlot<E>) {
    slot.reset();
}

/// Hook awaited with the operation's value on success
pub type SuccessHook<'a, T> = Box<dyn FnOnce(&T) -> BoxFuture<'a, ()> + Send + 'a>;

/// Hook awaited with the operation's failure
pub type ErrorHook<'a, E> = Box<dyn FnOnce(&E) -> BoxFuture<'a, ()> + Send + 'a>;

/// Hook awaited once the operation has settled either way
pub type FinallyHook<'a> = Box<dyn FnOnce() -> BoxFuture<'a, ()> + Send + 'a>;

/// A local mutation applied before the operation and undone if it fails.
pub struct Optimistic<'a> {
    apply: Box<dyn FnOnce() + Send + 'a>,
    rollback: Box<dyn FnOnce() + Send + 'a>,
}

impl<'a> Optimistic<'a> {
    /// Pair an immediate mutation with the mutation that undoes it
    pub fn new<A, R>(apply: A, rollback: R) -> Self
    where
        A: FnOnce() + Send + 'a,
        R: FnOnce() + Send + 'a,
    {
        Self {
            apply: Box::new(apply),
            rollback: Box::new(rollback),
        }
    }
}

impl std::fmt::Debug for Optimistic<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimistic").finish_non_exhaustive()
    }
}

/// Options for [`with_async_state`].
///
/// # Default Values
///
/// - no hooks
/// - `reset_retry_on_success`: true
/// - no optimistic mutation
pub struct AsyncOptions<'a, T, E> {
    on_success: Option<SuccessHook<'a, T>>,
    on_error: Option<ErrorHook<'a, E>>,
    on_finally: Option<FinallyHook<'a>>,
    reset_retry_on_success: bool,
    optimistic: Option<Optimistic<'a>>,
}

impl<'a, T, E> AsyncOptions<'a, T, E> {
    /// Options with no hooks and default settings
    #[must_use]
    pub const fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_finally: None,
            reset_retry_on_success: true,
            optimistic: None,
        }
    }

    /// Await `hook` with the value after a successful settlement.
    #[must_use]
    pub fn on_success<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(&T) -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        self.on_success = Some(Box::new(move |value: &T| hook(value).boxed()));
        self
    }

    /// Synchronous variant of [`AsyncOptions::on_success`].
    #[must_use]
    pub fn on_success_sync<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&T) + Send + 'a,
    {
        self.on_success = Some(Box::new(move |value: &T| {
            hook(value);
            futures::future::ready(()).boxed()
        }));
        self
    }

    /// Await `hook` with the failure after a failed settlement.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(&E) -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        self.on_error = Some(Box::new(move |error: &E| hook(error).boxed()));
        self
    }

    /// Synchronous variant of [`AsyncOptions::on_error`].
    #[must_use]
    pub fn on_error_sync<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&E) + Send + 'a,
    {
        self.on_error = Some(Box::new(move |error: &E| {
            hook(error);
            futures::future::ready(()).boxed()
        }));
        self
    }

    /// Await `hook` once after either branch, before returning.
    #[must_use]
    pub fn on_finally<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        self.on_finally = Some(Box::new(move || hook().boxed()));
        self
    }

    /// Synchronous variant of [`AsyncOptions::on_finally`].
    #[must_use]
    pub fn on_finally_sync<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'a,
    {
        self.on_finally = Some(Box::new(move || {
            hook();
            futures::future::ready(()).boxed()
        }));
        self
    }

    /// Whether a success resets `retry_count` to 0 (default: true)
    #[must_use]
    pub fn reset_retry_on_success(mut self, reset: bool) -> Self {
        self.reset_retry_on_success = reset;
        self
    }

    /// Apply `apply` before the operation, run `rollback` if it fails.
    #[must_use]
    pub fn optimistic<A, R>(mut self, apply: A, rollback: R) -> Self
    where
        A: FnOnce() + Send + 'a,
        R: FnOnce() + Send + 'a,
    {
        self.optimistic = Some(Optimistic::new(apply, rollback));
        self
    }
}

impl<T, E> Default for AsyncOptions<'_, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for AsyncOptions<'_, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finally", &self.on_finally.is_some())
            .field("reset_retry_on_success", &self.reset_retry_on_success)
            .field("optimistic", &self.optimistic)
            .finish()
    }
}

/// Run `operation` against `slot`, updating its bookkeeping.
///
/// Exactly one of `on_success` / `on_error` runs, and `on_finally` runs
/// exactly once after it. On failure the optimistic mutation (if any) is
/// rolled back before `on_error` runs. A panic inside `rollback` is not
/// caught and unwinds to the caller.
///
/// # Errors
///
/// Returns the operation's own failure, after recording it in the slot.
pub async fn with_async_state<'a, T, E, F, Fut>(
    slot: &AsyncSlot<E>,
    clock: &dyn Clock,
    operation: F,
    options: AsyncOptions<'a, T, E>,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Clone + std::fmt::Debug,
{
    let AsyncOptions {
        on_success,
        on_error,
        on_finally,
        reset_retry_on_success,
        optimistic,
    } = options;

    slot.update(|state| {
        state.loading = true;
        state.error = None;
    });
    AsyncStateMetrics::record_start();
    tracing::debug!(optimistic = optimistic.is_some(), "Async operation started");

    let rollback = optimistic.map(|Optimistic { apply, rollback }| {
        apply();
        rollback
    });

    let started = Instant::now();
    let result = match operation().await {
        Ok(value) => {
            let now = clock.now();
            slot.update(|state| {
                state.loading = false;
                state.last_fetch = Some(now);
                if reset_retry_on_success {
                    state.retry_count = 0;
                }
            });
            AsyncStateMetrics::record_success(started.elapsed());
            tracing::debug!(last_fetch = %now, "Async operation succeeded");

            if let Some(hook) = on_success {
                hook(&value).await;
            }

            Ok(value)
        },
        Err(error) => {
            let retry_count = slot.update(|state| {
                state.loading = false;
                state.error = Some(error.clone());
                state.retry_count = state.retry_count.saturating_add(1);
                state.retry_count
            });
            AsyncStateMetrics::record_failure(started.elapsed());
            tracing::warn!(retry_count, error = ?error, "Async operation failed");

            if let Some(rollback) = rollback {
                rollback();
                AsyncStateMetrics::record_rollback();
                tracing::debug!("Optimistic mutation rolled back");
            }

            if let Some(hook) = on_error {
                hook(&error).await;
            }

            Err(error)
        },
    };

    if let Some(hook) = on_finally {
        hook().await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store_testing::{test_clock, MockClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fresh_state_is_stale() {
        let state = AsyncState::<String>::new();
        let clock = test_clock();
        assert!(is_stale(&state, clock.now(), DEFAULT_STALE_TIME));
    }

    #[test]
    fn stale_threshold_is_exclusive() {
        let clock = test_clock();
        let mut state = AsyncState::<String>::new();
        state.last_fetch = Some(clock.now());

        let exactly = clock.now() + chrono::Duration::seconds(300);
        let beyond = exactly + chrono::Duration::milliseconds(1);

        assert!(!state.is_stale(exactly, DEFAULT_STALE_TIME));
        assert!(state.is_stale(beyond, DEFAULT_STALE_TIME));
    }

    #[tokio::test]
    async fn success_records_last_fetch_and_resets_retries() {
        let clock = MockClock::new(test_clock().now());
        let slot = AsyncSlot::<String>::new();
        slot.update(|state| {
            state.retry_count = 2;
            state.error = Some("previous".to_string());
        });

        let result = with_async_state(
            &slot,
            &clock,
            || async { Ok::<_, String>(7) },
            AsyncOptions::new(),
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(
            slot.snapshot(),
            AsyncState {
                loading: false,
                error: None,
                last_fetch: Some(clock.now()),
                retry_count: 0,
            }
        );
    }

    #[tokio::test]
    async fn staleness_follows_the_clock() {
        let clock = MockClock::new(test_clock().now());
        let slot = AsyncSlot::<String>::new();
        let stale_time = Duration::from_secs(60);

        assert!(slot.is_stale(&clock, stale_time));

        with_async_state(&slot, &clock, || async { Ok::<_, String>(()) }, AsyncOptions::new())
            .await
            .ok();
        assert!(!slot.is_stale(&clock, stale_time));

        clock.advance(Duration::from_secs(61));
        assert!(slot.is_stale(&clock, stale_time));
    }

    #[tokio::test]
    async fn success_can_keep_retry_count() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        slot.update(|state| state.retry_count = 3);

        with_async_state(
            &slot,
            &clock,
            || async { Ok::<_, String>(()) },
            AsyncOptions::new().reset_retry_on_success(false),
        )
        .await
        .ok();

        assert_eq!(slot.retry_count(), 3);
        assert!(slot.last_fetch().is_some());
    }

    #[tokio::test]
    async fn loading_is_visible_while_suspended() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        let observer = slot.clone();

        let result = with_async_state(
            &slot,
            &clock,
            || async move {
                tokio::task::yield_now().await;
                Ok::<_, String>(observer.is_loading())
            },
            AsyncOptions::new(),
        )
        .await;

        assert_eq!(result, Ok(true));
        assert!(!slot.is_loading());
    }

    #[tokio::test]
    async fn failure_rolls_back_and_runs_error_hooks() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        slot.update(|state| state.retry_count = 1);

        let local = Arc::new(Mutex::new(vec!["a".to_string()]));
        let successes = AtomicUsize::new(0);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let finals = AtomicUsize::new(0);

        let apply_target = Arc::clone(&local);
        let rollback_target = Arc::clone(&local);
        let seen_errors = Arc::clone(&errors);

        let result = with_async_state(
            &slot,
            &clock,
            || async { Err::<(), _>("boom".to_string()) },
            AsyncOptions::new()
                .optimistic(
                    move || {
                        apply_target
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push("b".to_string());
                    },
                    move || {
                        rollback_target
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop();
                    },
                )
                .on_success_sync(|_: &()| {
                    successes.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |error: &String| {
                    let error = error.clone();
                    async move {
                        seen_errors
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(error);
                    }
                })
                .on_finally_sync(|| {
                    finals.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(
            *local.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["a".to_string()]
        );

        let state = slot.snapshot();
        assert!(!state.loading);
        assert_eq!(state.error, Some("boom".to_string()));
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.last_fetch, None);

        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(
            *errors.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["boom".to_string()]
        );
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_keeps_optimistic_mutation() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        let rolled_back = AtomicUsize::new(0);
        let applied = AtomicUsize::new(0);
        let seen = Arc::new(Mutex::new(None));
        let seen_hook = Arc::clone(&seen);

        let result = with_async_state(
            &slot,
            &clock,
            || async { Ok::<_, String>("done") },
            AsyncOptions::new()
                .optimistic(
                    || {
                        applied.fetch_add(1, Ordering::SeqCst);
                    },
                    || {
                        rolled_back.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .on_success(move |value: &&str| {
                    let value = (*value).to_string();
                    async move {
                        *seen_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
                    }
                }),
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(rolled_back.load(Ordering::SeqCst), 0);
        assert_eq!(
            *seen.lock().unwrap_or_else(PoisonError::into_inner),
            Some("done".to_string())
        );
    }

    #[tokio::test]
    async fn error_is_cleared_when_next_operation_starts() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();

        with_async_state(&slot, &clock, || async { Err::<(), _>("first".to_string()) }, AsyncOptions::new())
            .await
            .ok();
        assert_eq!(slot.error(), Some("first".to_string()));

        let observer = slot.clone();
        let seen = with_async_state(
            &slot,
            &clock,
            || async move { Ok::<_, String>(observer.error()) },
            AsyncOptions::new(),
        )
        .await;

        assert_eq!(seen, Ok(None));
        assert_eq!(slot.retry_count(), 0);
    }

    #[test]
    fn reset_restores_defaults() {
        let slot = AsyncSlot::<String>::new();
        slot.update(|state| {
            state.loading = true;
            state.error = Some("x".to_string());
            state.last_fetch = Some(test_clock().now());
            state.retry_count = 4;
        });

        reset_async_state(&slot);

        assert_eq!(slot.snapshot(), AsyncState::new());
    }

    #[test]
    fn invalidate_only_clears_last_fetch() {
        let slot = AsyncSlot::<String>::new();
        slot.update(|state| {
            state.last_fetch = Some(test_clock().now());
            state.retry_count = 1;
        });

        slot.invalidate();

        assert_eq!(slot.last_fetch(), None);
        assert_eq!(slot.retry_count(), 1);
    }

    fn recording_options<'a, T: 'a>(
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> AsyncOptions<'a, T, String> {
        let record = |step: &'static str| {
            let log = Arc::clone(log);
            move || log.lock().unwrap_or_else(PoisonError::into_inner).push(step)
        };
        let on_success = record("success");
        let on_error = record("error");
        let on_finally = record("finally");

        AsyncOptions::new()
            .optimistic(record("apply"), record("rollback"))
            .on_success_sync(move |_: &T| on_success())
            .on_error_sync(move |_: &String| on_error())
            .on_finally_sync(on_finally)
    }

    #[tokio::test]
    async fn success_runs_hooks_in_order_and_finally_once() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let result = with_async_state(
            &slot,
            &clock,
            || async { Ok::<_, String>(1) },
            recording_options(&log),
        )
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(
            *log.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["apply", "success", "finally"]
        );
    }

    #[tokio::test]
    async fn failure_rolls_back_before_error_hook_then_finally() {
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let result = with_async_state(
            &slot,
            &clock,
            || async { Err::<(), _>("nope".to_string()) },
            recording_options(&log),
        )
        .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(
            *log.lock().unwrap_or_else(PoisonError::into_inner),
            vec!["apply", "rollback", "error", "finally"]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn stale_exactly_when_older_than_threshold(
                elapsed_ms in 0i64..10_000_000,
                stale_ms in 0u64..10_000_000,
            ) {
                let fetched = test_clock().now();
                let state = AsyncState::<String> {
                    last_fetch: Some(fetched),
                    ..AsyncState::new()
                };
                let now = fetched + chrono::Duration::milliseconds(elapsed_ms);

                prop_assert_eq!(
                    state.is_stale(now, Duration::from_millis(stale_ms)),
                    elapsed_ms.unsigned_abs() > stale_ms
                );
            }
        }
    }
}

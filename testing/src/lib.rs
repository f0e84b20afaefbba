//! # Catalog Store Testing
//!
//! Testing utilities and helpers for the catalog store.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `MockClock`)
//! - Assertion helpers for async operation slots
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```
//! use catalog_store_core::environment::Clock;
//! use catalog_store_testing::{test_clock, MockClock};
//! use std::time::Duration;
//!
//! let clock = MockClock::new(test_clock().now());
//! let start = clock.now();
//! clock.advance(Duration::from_secs(301));
//! assert_eq!((clock.now() - start).num_seconds(), 301);
//! ```

use chrono::{DateTime, Utc};
use catalog_store_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use catalog_store_testing::mocks::FixedClock;
    /// use catalog_store_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Manually advanced clock for staleness tests
    ///
    /// Clones share the same time, so a test can keep one handle and hand
    /// another to the code under test.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl MockClock {
        /// Create a clock starting at `start`
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(start)),
            }
        }

        /// Move the clock forward by `by`
        ///
        /// Steps that do not fit in a `DateTime<Utc>` leave the clock unchanged.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(next) = chrono::Duration::from_std(by)
                .ok()
                .and_then(|delta| time.checked_add_signed(delta))
            {
                *time = next;
            }
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Helper assertions for async operation slots
pub mod assertions {
    use catalog_store_runtime::AsyncSlot;
    use std::fmt::Debug;

    /// Assert the slot settled successfully: idle, no error, `last_fetch` set
    ///
    /// # Panics
    ///
    /// Panics if any of the three conditions does not hold.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_settled_ok<E: Clone + Debug>(slot: &AsyncSlot<E>) {
        let state = slot.snapshot();
        assert!(!state.loading, "Expected slot to be idle, but it is loading");
        assert!(
            state.error.is_none(),
            "Expected no error, but found {:?}",
            state.error
        );
        assert!(
            state.last_fetch.is_some(),
            "Expected last_fetch to be set after a success"
        );
    }

    /// Assert the slot settled with `expected` after `retry_count` failures
    ///
    /// # Panics
    ///
    /// Panics if the slot is loading, holds another error, or reports a
    /// different retry count.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_failed_with<E: Clone + Debug + PartialEq>(
        slot: &AsyncSlot<E>,
        expected: &E,
        retry_count: u32,
    ) {
        let state = slot.snapshot();
        assert!(!state.loading, "Expected slot to be idle, but it is loading");
        assert_eq!(state.error.as_ref(), Some(expected), "Unexpected slot error");
        assert_eq!(state.retry_count, retry_count, "Unexpected retry count");
    }

    /// Assert the slot is in its creation state
    ///
    /// # Panics
    ///
    /// Panics if any field differs from its default.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_untouched<E: Clone + Debug + PartialEq>(slot: &AsyncSlot<E>) {
        let state = slot.snapshot();
        assert!(
            !state.loading
                && state.error.is_none()
                && state.last_fetch.is_none()
                && state.retry_count == 0,
            "Expected a fresh slot, but found {state:?}"
        );
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_store_runtime=debug,catalog_products=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, MockClock};

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store_runtime::{with_async_state, AsyncOptions, AsyncSlot};
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn mock_clock_clones_share_time() {
        let clock = MockClock::new(test_clock().now());
        let handle = clock.clone();

        handle.advance(Duration::from_millis(1500));

        assert_eq!((clock.now() - test_clock().now()).num_milliseconds(), 1500);

        clock.set(test_clock().now());
        assert_eq!(handle.now(), test_clock().now());
    }

    #[tokio::test]
    async fn slot_assertions_follow_settlement() {
        init_test_tracing();
        let clock = test_clock();
        let slot = AsyncSlot::<String>::new();
        assertions::assert_untouched(&slot);

        let _ = with_async_state(
            &slot,
            &clock,
            || async { Err::<(), _>("down".to_string()) },
            AsyncOptions::new(),
        )
        .await;
        assertions::assert_failed_with(&slot, &"down".to_string(), 1);

        let _ = with_async_state(&slot, &clock, || async { Ok::<_, String>(()) }, AsyncOptions::new())
            .await;
        assertions::assert_settled_ok(&slot);
    }
}

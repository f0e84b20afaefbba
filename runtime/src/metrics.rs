//! Metrics for tracked async operations.
//!
//! Counters are emitted through the `metrics` facade; install any recorder
//! (Prometheus, statsd, ...) in the host binary to collect them. Without a
//! recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Register all metric descriptions.
///
/// Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "async_operations_started_total",
        "Total number of tracked async operations started"
    );
    describe_counter!(
        "async_operations_succeeded_total",
        "Total number of tracked async operations that succeeded"
    );
    describe_counter!(
        "async_operations_failed_total",
        "Total number of tracked async operations that failed"
    );
    describe_counter!(
        "async_operations_rolled_back_total",
        "Total number of optimistic mutations rolled back after a failure"
    );
    describe_gauge!(
        "async_operations_in_flight",
        "Tracked async operations currently awaiting settlement"
    );
    describe_histogram!(
        "async_operation_duration_seconds",
        "Time from operation start to settlement"
    );
}

/// Async operation metrics recorder.
pub struct AsyncStateMetrics;

impl AsyncStateMetrics {
    /// Record an operation start.
    pub fn record_start() {
        counter!("async_operations_started_total").increment(1);
        gauge!("async_operations_in_flight").increment(1.0);
    }

    /// Record a successful settlement.
    pub fn record_success(duration: Duration) {
        counter!("async_operations_succeeded_total").increment(1);
        Self::record_settled(duration);
    }

    /// Record a failed settlement.
    pub fn record_failure(duration: Duration) {
        counter!("async_operations_failed_total").increment(1);
        Self::record_settled(duration);
    }

    /// Record an optimistic rollback.
    pub fn record_rollback() {
        counter!("async_operations_rolled_back_total").increment(1);
    }

    fn record_settled(duration: Duration) {
        gauge!("async_operations_in_flight").decrement(1.0);
        histogram!("async_operation_duration_seconds").record(duration.as_secs_f64());
    }
}

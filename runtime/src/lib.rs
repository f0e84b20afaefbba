//! # Catalog Store Runtime
//!
//! Async operation tracking for the catalog store.
//!
//! This crate wraps single asynchronous operations (remote calls) with the
//! bookkeeping a store needs to expose: whether the operation is loading,
//! its last error, when it last succeeded (for staleness) and how many times
//! in a row it failed. It also applies and rolls back optimistic local
//! mutations around the operation.
//!
//! ## Core Concepts
//!
//! - **`AsyncState`**: the four bookkeeping fields of one operation slot
//! - **`AsyncSlot`**: a shared handle to one `AsyncState`
//! - **`with_async_state`**: runs an operation against a slot
//! - **`AsyncOptions`**: lifecycle hooks, retry reset policy and optimistic mutation
//!
//! ## Example
//!
//! ```
//! use catalog_store_core::environment::SystemClock;
//! use catalog_store_runtime::{with_async_state, AsyncOptions, AsyncSlot, DEFAULT_STALE_TIME};
//!
//! # async fn example() {
//! let clock = SystemClock;
//! let slot: AsyncSlot<String> = AsyncSlot::new();
//! assert!(slot.is_stale(&clock, DEFAULT_STALE_TIME));
//!
//! let _ = with_async_state(
//!     &slot,
//!     &clock,
//!     || async { Err::<(), _>("offline".to_string()) },
//!     AsyncOptions::new(),
//! )
//! .await;
//!
//! assert_eq!(slot.retry_count(), 1);
//! assert_eq!(slot.error().as_deref(), Some("offline"));
//! # }
//! ```

/// Async operation bookkeeping and the tracker itself
pub mod async_state;

/// Metrics emitted by the tracker
pub mod metrics;

pub use async_state::{
    is_stale, reset_async_state, with_async_state, AsyncOptions, AsyncSlot, AsyncState,
    Optimistic, DEFAULT_STALE_TIME,
};

//! Configuration for the product store.
//!
//! Loads configuration from environment variables with sensible defaults.

use catalog_store_runtime::DEFAULT_STALE_TIME;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Age in milliseconds after which the cached product list is refetched
    pub stale_time_ms: u64,
    /// Log level for the demo binary (trace, debug, info, warn, error)
    pub log_level: String,
}

impl StoreConfig {
    /// Load configuration from environment variables
    ///
    /// - `CATALOG_STALE_TIME_MS` (default: 300000)
    /// - `CATALOG_LOG_LEVEL` (default: info)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stale_time_ms: env::var("CATALOG_STALE_TIME_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stale_time_ms),
            log_level: env::var("CATALOG_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// The staleness threshold as a [`Duration`]
    #[must_use]
    pub const fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: u64::try_from(DEFAULT_STALE_TIME.as_millis()).unwrap_or(u64::MAX),
            log_level: "info".to_string(),
        }
    }
}

/// Builder for [`StoreConfig`].
#[derive(Debug, Clone, Default)]
pub struct StoreConfigBuilder {
    stale_time: Option<Duration>,
    log_level: Option<String>,
}

impl StoreConfigBuilder {
    /// Set the staleness threshold.
    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Set the demo log level.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build the [`StoreConfig`].
    #[must_use]
    pub fn build(self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            stale_time_ms: self
                .stale_time
                .map_or(defaults.stale_time_ms, |d| {
                    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
                }),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        }
    }
}

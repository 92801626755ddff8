//! Pipeline configuration.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HS_COLLECTION` | `action_traces` |
//! | `HS_MAX_QUEUE_SIZE` | `1024` |
//! | `HS_QUEUE_DELAY_STEP_MS` | `10` |
//! | `HS_QUEUE_STUCK_MS` | `1000` |
//! | `HS_SLOW_BATCH_MS` | `500` |
//! | `HS_SCHEMA_CACHE_SIZE` | `256` |
//! | `HS_RETRY_BACKOFF_MS` | `200` |
//! | `HS_MAX_RETRY_BACKOFF_MS` | `5000` |
//! | `HS_MAX_QUERY_LIMIT` | `1000` |

use crate::domain::queue::BackpressureConfig;
use crate::service::worker::WorkerSettings;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "action_traces";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Collection name must not be empty")]
    EmptyCollection,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("Retry backoff ceiling {ceiling:?} is below the initial backoff {initial:?}")]
    BackoffCeiling { initial: Duration, ceiling: Duration },
}

/// Action history synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Target collection.
    pub collection: String,
    /// Queue depth above which producers are throttled.
    pub max_queue_size: usize,
    /// Growth step of the producer delay.
    pub delay_increment: Duration,
    /// Delay past which throttling is logged as stuck.
    pub stuck_threshold: Duration,
    /// Batches slower than this are logged.
    pub slow_batch_threshold: Duration,
    /// Per-account schema cache capacity.
    pub schema_cache_size: usize,
    /// Pause before the first retry after a store failure.
    pub retry_backoff: Duration,
    /// Ceiling for the doubling retry pause.
    pub max_retry_backoff: Duration,
    /// Upper bound for a query's `limit`.
    pub max_query_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            max_queue_size: 1024,
            delay_increment: Duration::from_millis(10),
            stuck_threshold: Duration::from_millis(1000),
            slow_batch_threshold: Duration::from_millis(500),
            schema_cache_size: 256,
            retry_backoff: Duration::from_millis(200),
            max_retry_backoff: Duration::from_millis(5000),
            max_query_limit: 1000,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `HS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(collection) = lookup("HS_COLLECTION") {
            config.collection = collection;
        }
        if let Some(v) = parse(&lookup, "HS_MAX_QUEUE_SIZE")? {
            config.max_queue_size = v;
        }
        if let Some(ms) = parse(&lookup, "HS_QUEUE_DELAY_STEP_MS")? {
            config.delay_increment = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "HS_QUEUE_STUCK_MS")? {
            config.stuck_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "HS_SLOW_BATCH_MS")? {
            config.slow_batch_threshold = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, "HS_SCHEMA_CACHE_SIZE")? {
            config.schema_cache_size = v;
        }
        if let Some(ms) = parse(&lookup, "HS_RETRY_BACKOFF_MS")? {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "HS_MAX_RETRY_BACKOFF_MS")? {
            config.max_retry_backoff = Duration::from_millis(ms);
        }
        if let Some(v) = parse(&lookup, "HS_MAX_QUERY_LIMIT")? {
            config.max_query_limit = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }
        if self.schema_cache_size == 0 {
            return Err(ConfigError::Zero {
                field: "schema_cache_size",
            });
        }
        if self.max_retry_backoff < self.retry_backoff {
            return Err(ConfigError::BackoffCeiling {
                initial: self.retry_backoff,
                ceiling: self.max_retry_backoff,
            });
        }
        if self.max_query_limit == 0 {
            return Err(ConfigError::Zero {
                field: "max_query_limit",
            });
        }
        if self.delay_increment.is_zero() {
            return Err(ConfigError::Zero {
                field: "delay_increment",
            });
        }
        Ok(())
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn with_delay_increment(mut self, delay_increment: Duration) -> Self {
        self.delay_increment = delay_increment;
        self
    }

    pub fn with_stuck_threshold(mut self, stuck_threshold: Duration) -> Self {
        self.stuck_threshold = stuck_threshold;
        self
    }

    pub fn with_slow_batch_threshold(mut self, threshold: Duration) -> Self {
        self.slow_batch_threshold = threshold;
        self
    }

    pub fn with_schema_cache_size(mut self, size: usize) -> Self {
        self.schema_cache_size = size;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_retry_backoff(mut self, ceiling: Duration) -> Self {
        self.max_retry_backoff = ceiling;
        self
    }

    pub fn with_max_query_limit(mut self, limit: u32) -> Self {
        self.max_query_limit = limit;
        self
    }

    pub fn backpressure(&self) -> BackpressureConfig {
        BackpressureConfig {
            max_queue_size: self.max_queue_size,
            delay_increment: self.delay_increment,
            stuck_threshold: self.stuck_threshold,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            collection: self.collection.clone(),
            slow_batch_threshold: self.slow_batch_threshold,
            retry_backoff: self.retry_backoff,
            max_retry_backoff: self.max_retry_backoff,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behaviour for one task execution.
///
/// Global defaults come from the `[retry]` configuration section; a task can
/// override either field through its metadata bag
/// (`{"max_retries": 3, "retry_backoff_ms": 0}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            retry_backoff_ms,
        }
    }

    /// Overlay the overrides found in a task metadata bag on `defaults`.
    ///
    /// Missing, negative or non-numeric values keep the default.
    pub fn from_metadata(metadata: &serde_json::Value, defaults: RetryPolicy) -> Self {
        let max_retries = metadata
            .get("max_retries")
            .and_then(serde_json::Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(defaults.max_retries);
        let retry_backoff_ms = metadata
            .get("retry_backoff_ms")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(defaults.retry_backoff_ms);
        Self {
            max_retries,
            retry_backoff_ms,
        }
    }

    /// Attempts actually made; a zero budget still runs once.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

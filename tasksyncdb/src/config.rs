//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config file:
//!
//! ```json
//! { "push_timeout_ms": 3000, "retry": { "max_attempts": null } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote collection holding one child per task id.
    pub tasks_path: String,
    pub push_timeout_ms: u64,
    pub connectivity_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tasks_path: "tasks".to_string(),
            push_timeout_ms: 10_000,
            connectivity_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&contents)?;
        log::debug!("Loaded sync config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity_timeout_ms)
    }

    /// Remote path of a single task.
    pub fn task_path(&self, id: &str) -> String {
        format!("{}/{}", self.tasks_path.trim_end_matches('/'), id)
    }
}

/// Per-entry retry budget for the retry queue drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Failed queue attempts before an entry is parked until the next
    /// `sync_all`. `None` keeps cycling an entry until it succeeds or
    /// connectivity is lost.
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts and no attempt cap.
    pub fn immediate() -> Self {
        Self {
            max_attempts: None,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the next push of an entry that has already failed
    /// `attempts` times in the queue: `base * 2^(attempts - 1)`, capped.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if attempts == 0 || self.base_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempts - 1).min(20);
        let millis = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

//! Configuration for the worker pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long an idle worker sleeps before asking the queue again, in
    /// milliseconds.
    #[serde(default = "default_lease_poll_ms")]
    pub lease_poll_ms: u64,

    /// Delay before the first retry, in seconds. Doubles on each further
    /// attempt.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Upper bound on the retry delay, in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// How long to wait for in-flight tasks when stopping, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_lease_poll_ms() -> u64 {
    500
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_backoff_cap_secs() -> u64 {
    3600
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            lease_poll_ms: default_lease_poll_ms(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn lease_poll(&self) -> Duration {
        Duration::from_millis(self.lease_poll_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Exponential backoff for the given attempt number (1-based):
    /// `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let secs = self
            .backoff_base_secs
            .saturating_mul(factor)
            .min(self.backoff_cap_secs);
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.backoff_base_secs, 30);
        assert_eq!(config.backoff_cap_secs, 3600);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = WorkerConfig {
            backoff_base_secs: 30,
            backoff_cap_secs: 100,
            ..WorkerConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_secs(30));
        assert_eq!(config.backoff(2), Duration::from_secs(60));
        assert_eq!(config.backoff(3), Duration::from_secs(100));
        assert_eq!(config.backoff(60), Duration::from_secs(100));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: WorkerConfig = toml::from_str("concurrency = 1").unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.lease_poll_ms, 500);
    }
}

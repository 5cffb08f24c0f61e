//! Configuration for the directory watcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for both detection mechanisms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Interval between full-tree poll scans in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum time since a file's last modification before it is eligible
    /// for dispatch, in milliseconds.
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,

    /// Files smaller than this are never dispatched (rejects empty or
    /// partially written files).
    #[serde(default = "default_min_file_size")]
    pub min_file_size_bytes: u64,

    /// Interval between size checks of the push detector's stabilization
    /// probe, in milliseconds.
    #[serde(default = "default_stabilize_interval_ms")]
    pub stabilize_interval_ms: u64,

    /// Maximum total time a stabilization probe keeps checking a single file
    /// before giving up, in milliseconds. The poll detector still picks the
    /// file up later.
    #[serde(default = "default_stabilize_timeout_ms")]
    pub stabilize_timeout_ms: u64,

    /// Number of consecutive poll cycles a file must be observed unchanged
    /// before the poll detector promotes it.
    #[serde(default = "default_poll_cycles")]
    pub poll_cycles_required: u32,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_quiet_window_ms() -> u64 {
    2_000
}

fn default_min_file_size() -> u64 {
    1
}

fn default_stabilize_interval_ms() -> u64 {
    500
}

fn default_stabilize_timeout_ms() -> u64 {
    30_000
}

fn default_poll_cycles() -> u32 {
    2
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            quiet_window_ms: default_quiet_window_ms(),
            min_file_size_bytes: default_min_file_size(),
            stabilize_interval_ms: default_stabilize_interval_ms(),
            stabilize_timeout_ms: default_stabilize_timeout_ms(),
            poll_cycles_required: default_poll_cycles(),
        }
    }
}

impl WatcherConfig {
    /// Interval between poll scans.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Quiet window a file must satisfy before dispatch.
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    /// Interval between stabilization probe checks.
    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    /// Total budget for one stabilization probe.
    pub fn stabilize_timeout(&self) -> Duration {
        Duration::from_millis(self.stabilize_timeout_ms)
    }
}

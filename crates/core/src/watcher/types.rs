//! Types for the watcher module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// A file observed by a detector but not yet confirmed stable.
///
/// Lives in the shared pending table and is mutated on every detection tick
/// that touches its path.
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Size at the last observation.
    pub size: u64,
    /// Modification time at the last observation.
    pub modified: SystemTime,
    /// Consecutive poll cycles the file has been observed unchanged,
    /// including the cycle that created the entry.
    pub unchanged_cycles: u32,
}

/// A confirmed-stable file, emitted exactly once per file version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFile {
    /// Absolute path under the ingest root.
    pub path: PathBuf,
    /// Size in bytes at detection time.
    pub size: u64,
    /// When the detection was emitted.
    pub detected_at: DateTime<Utc>,
    /// Whether this detection was produced by an operator-driven retry
    /// rather than first-time discovery.
    pub is_retry: bool,
}

impl DetectedFile {
    /// Builds a first-time detection for the given path.
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            detected_at: Utc::now(),
            is_retry: false,
        }
    }

    /// Builds a retry detection for the given path.
    pub fn retry(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            detected_at: Utc::now(),
            is_retry: true,
        }
    }
}

/// Snapshot of watcher internals for operator status queries.
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    /// Whether the watcher loops are running.
    pub running: bool,
    /// Whether the push-notification subsystem is operational. `false` with
    /// `running == true` means the watcher degraded to poll-only mode.
    pub push_active: bool,
    /// Files currently tracked as pending (seen, not yet stable).
    pub pending_files: usize,
    /// Paths with a dispatched version recorded.
    pub known_files: usize,
    /// Directories covered by the push detector.
    pub watched_dirs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_file_constructors() {
        let first = DetectedFile::new(PathBuf::from("/media/a.jpg"), 500_000);
        assert!(!first.is_retry);
        assert_eq!(first.size, 500_000);

        let again = DetectedFile::retry(PathBuf::from("/media/a.jpg"), 500_000);
        assert!(again.is_retry);
    }

    #[test]
    fn test_detected_file_wire_shape() {
        let detected = DetectedFile::new(PathBuf::from("/media/photo1.jpg"), 42);
        let json = serde_json::to_string(&detected).unwrap();
        assert!(json.contains("\"path\":\"/media/photo1.jpg\""));
        assert!(json.contains("\"is_retry\":false"));
    }
}

//! Types for the quarantine module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::worker::FailureStage;

/// Extension appended to a quarantined file's full name to form its sidecar.
pub const SIDECAR_EXTENSION: &str = "error";

/// Failure description stored in a quarantined file's sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Where the file lived when ingestion failed, relative to the
    /// ingestion root; the retry target is this path joined under the
    /// current root.
    pub original_path: PathBuf,
    /// Last handler error message.
    pub error: String,
    /// Pipeline stage that failed.
    pub stage: FailureStage,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// When the file was quarantined.
    pub timestamp: DateTime<Utc>,
    /// Worker that made the final attempt.
    pub worker_id: String,
    /// Optional handler-provided diagnostic detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// A quarantined file as presented to operators.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    /// Absolute path inside the quarantine area.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// When the file was last modified (in practice, when it was
    /// quarantined).
    pub modified: DateTime<Utc>,
    /// Sidecar contents; `None` when the sidecar is missing or unreadable.
    pub record: Option<QuarantineRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_shape() {
        let record = QuarantineRecord {
            original_path: PathBuf::from("2026/08/photo1.jpg"),
            error: "hash: truncated file".to_string(),
            stage: FailureStage::Hash,
            attempts: 3,
            timestamp: Utc::now(),
            worker_id: "a1b2c3d4-0".to_string(),
            stack_trace: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stage"], "hash");
        assert_eq!(json["attempts"], 3);
        assert!(json.get("stack_trace").is_none());

        let back: QuarantineRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}

//! Types for the queue module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Task type identifier for media ingestion tasks.
pub const TASK_TYPE_MEDIA_INGEST: &str = "media:ingest";

/// Durable payload of an ingestion task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestPayload {
    /// Absolute path of the detected file.
    pub file_path: PathBuf,
    /// When the detection was emitted.
    pub detected_at: DateTime<Utc>,
    /// File size at detection time.
    pub file_size: u64,
    /// Whether this task came from an operator-driven retry.
    pub is_retry: bool,
}

/// A task submission before the queue assigns it an identity.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Handler selector.
    pub task_type: String,
    /// Target queue name.
    pub queue: String,
    /// Uniqueness key; for ingestion tasks, the file's absolute path.
    pub unique_key: String,
    /// Opaque JSON payload.
    pub payload: serde_json::Value,
    /// Attempts before the task is archived.
    pub max_attempts: u32,
    /// Hard execution timeout in seconds.
    pub timeout_secs: u64,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting to be leased.
    Pending,
    /// Leased by a worker.
    Active,
    /// Waiting for its retry time.
    Scheduled,
    /// Retries exhausted; kept for the record.
    Archived,
    /// Finished successfully.
    Completed,
}

impl TaskState {
    /// States that hold the task's uniqueness key.
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Scheduled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Scheduled => "scheduled",
            Self::Archived => "archived",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "scheduled" => Some(Self::Scheduled),
            "archived" => Some(Self::Archived),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A task as seen by workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Queue-assigned identifier.
    pub id: String,
    /// Handler selector.
    pub task_type: String,
    /// Queue the task belongs to.
    pub queue: String,
    /// Uniqueness key.
    pub unique_key: String,
    /// Opaque JSON payload.
    pub payload: serde_json::Value,
    /// Completed execution attempts so far.
    pub attempts: u32,
    /// Attempts before the task is archived.
    pub max_attempts: u32,
    /// Hard execution timeout in seconds.
    pub timeout_secs: u64,
    /// When the task was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Last handler error, if any.
    pub last_error: Option<String>,
}

/// Result of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// A new task was created with this id.
    Accepted(String),
    /// An outstanding task with the same uniqueness key already exists
    /// within the TTL window; nothing was enqueued. Not an error.
    Duplicate,
}

impl Enqueued {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Per-queue counters for the inspection interface.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,
    /// Whether leasing is paused.
    pub paused: bool,
    /// Tasks waiting to be leased.
    pub pending: usize,
    /// Tasks currently executing.
    pub active: usize,
    /// Never-attempted tasks waiting for a scheduled time.
    pub scheduled: usize,
    /// Failed tasks waiting for their retry time.
    pub retry: usize,
    /// Tasks that exhausted their retries.
    pub archived: usize,
    /// Tasks finished successfully since startup (or since the backend's
    /// records began).
    pub completed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_round_trip() {
        for state in [
            TaskState::Pending,
            TaskState::Active,
            TaskState::Scheduled,
            TaskState::Archived,
            TaskState::Completed,
        ] {
            assert_eq!(TaskState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TaskState::parse("bogus"), None);
    }

    #[test]
    fn test_outstanding_states_hold_the_key() {
        assert!(TaskState::Pending.is_outstanding());
        assert!(TaskState::Active.is_outstanding());
        assert!(TaskState::Scheduled.is_outstanding());
        assert!(!TaskState::Archived.is_outstanding());
        assert!(!TaskState::Completed.is_outstanding());
    }

    #[test]
    fn test_ingest_payload_wire_shape() {
        let payload = IngestPayload {
            file_path: PathBuf::from("/media/photo1.jpg"),
            detected_at: Utc::now(),
            file_size: 500_000,
            is_retry: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["file_path"], "/media/photo1.jpg");
        assert_eq!(json["file_size"], 500_000);
        assert_eq!(json["is_retry"], false);
        let back: IngestPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }
}

//! Error types for the queue module.

use thiserror::Error;

/// Errors that can occur in queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// The named queue is not configured.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Backend (database) error.
    #[error("Queue backend error: {0}")]
    Backend(String),

    /// Payload could not be serialized or deserialized.
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

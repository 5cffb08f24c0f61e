//! Handler and failure-sink traits for the worker pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::queue::Task;

/// Pipeline stage a task failed in. Recorded alongside quarantined files so
/// an operator can tell a corrupt image from a broken database without
/// reading logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Hash,
    Resize,
    Metadata,
    Database,
    Timeout,
    Unknown,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Resize => "resize",
            Self::Metadata => "metadata",
            Self::Database => "database",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed task execution.
#[derive(Debug, Clone, Error)]
#[error("{stage}: {message}")]
pub struct HandlerError {
    /// Stage the handler failed in.
    pub stage: FailureStage,
    /// Human-readable description.
    pub message: String,
}

impl HandlerError {
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Executes tasks of one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task type this handler accepts.
    fn task_type(&self) -> &str;

    /// Processes one task. Must be cancel-safe: the pool drops the future
    /// when the task's timeout elapses.
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Notified when a task exhausts its attempts and is archived.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn on_exhausted(
        &self,
        task: &Task,
        attempts: u32,
        error: &HandlerError,
        worker_id: &str,
    );
}

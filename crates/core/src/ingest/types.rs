//! Types for the ingestion service.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::quarantine::QuarantineError;
use crate::queue::{QueueError, QueueStats};
use crate::watcher::{WatcherError, WatcherStatus};

/// Errors surfaced by the ingestion service.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
}

/// Snapshot of the whole pipeline for operators.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    /// Whether the service is started.
    pub running: bool,
    /// Watcher internals.
    pub watcher: WatcherStatus,
    /// Per-queue task counters.
    pub queues: Vec<QueueStats>,
}

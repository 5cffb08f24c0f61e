use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::quarantine::QuarantineConfig;
use crate::queue::QueueConfig;
use crate::watcher::WatcherConfig;
use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub quarantine: QuarantineConfig,
}

/// Top-level ingestion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Directory watched for new media files.
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,

    /// Task queue database file. When unset, the queue lives in memory and
    /// queued work does not survive restarts.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("./ingest")
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            database_path: None,
        }
    }
}

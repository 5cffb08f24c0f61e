//! Error types for the watcher module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while setting up the watcher. Runtime trouble
/// (a lost notification backend, unreadable entries) degrades and logs
/// instead of erroring.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// The ingest root does not exist or is not a directory.
    #[error("Ingest root is not a directory: {path}")]
    RootNotADirectory { path: PathBuf },
}

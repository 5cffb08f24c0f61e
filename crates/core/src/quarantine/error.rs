//! Error types for the quarantine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during quarantine operations.
#[derive(Debug, Error)]
pub enum QuarantineError {
    /// The referenced file does not exist.
    #[error("Quarantined file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The given path does not resolve to a location under the quarantine
    /// root.
    #[error("Path is outside the quarantine area: {path}")]
    OutsideQuarantineRoot { path: PathBuf },

    /// The restore target already exists.
    #[error("Restore destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// The sidecar's recorded original path cannot be restored to.
    #[error("Recorded original path is not restorable: {path}")]
    InvalidOriginalPath { path: PathBuf },

    /// Filesystem error.
    #[error("Quarantine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar (de)serialization error.
    #[error("Sidecar serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

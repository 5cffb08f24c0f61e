//! Configuration for the quarantine area.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the quarantine area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineConfig {
    /// Directory failed files are moved into. Must not live inside the
    /// watched ingestion root.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("./quarantine")
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

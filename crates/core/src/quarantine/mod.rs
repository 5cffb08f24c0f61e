//! Quarantine area for files whose ingestion exhausted its retries.
//!
//! Failed files are moved out of the watched tree into dated directories so
//! the watcher stops rediscovering them, with a JSON sidecar describing the
//! failure next to each file. Operators can list, retry, or delete
//! quarantined files.

mod config;
mod error;
mod manager;
mod types;

pub use config::QuarantineConfig;
pub use error::QuarantineError;
pub use manager::QuarantineManager;
pub use types::{FailedEntry, QuarantineRecord, SIDECAR_EXTENSION};

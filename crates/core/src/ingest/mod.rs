//! Top-level ingestion service.
//!
//! Wires the watcher, queue, worker pool, and quarantine together and
//! exposes the operator surface: lifecycle, status, queue pause/resume,
//! and quarantine inspection.

mod service;
mod types;

pub use service::IngestService;
pub use types::{IngestError, IngestStatus};

//! Testing utilities and mock implementations.
//!
//! Mock implementations of the pipeline's seams, so the watcher, queue,
//! worker pool, and quarantine can each be tested without the others.
//!
//! # Example
//!
//! ```rust,ignore
//! use darkroom_core::testing::{CollectingSink, MockHandler};
//!
//! let sink = CollectingSink::new();
//! // ... run a watcher against it ...
//! assert_eq!(sink.detections().len(), 1);
//! ```

mod collecting_sink;
mod mock_handler;
mod recording_failure_sink;

pub use collecting_sink::CollectingSink;
pub use mock_handler::MockHandler;
pub use recording_failure_sink::{ExhaustedRecord, RecordingFailureSink};

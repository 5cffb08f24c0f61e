//! Directory watcher for the ingest root.
//!
//! Two independent detection mechanisms race against each other so that
//! dropped filesystem notifications never cause a silent miss:
//!
//! - **Push detector**: `notify` change events, with a bounded active
//!   stabilization probe per touched file.
//! - **Poll detector**: a periodic full-tree walk that promotes files after
//!   they have been observed unchanged across consecutive cycles.
//!
//! Both detectors share one [`WatchState`] behind a single lock and one
//! stability predicate ([`stability::is_stable`]), and both emit through the
//! [`DetectionSink`] trait. The known-files map collapses their output to at
//! most one detection per file version; any residual race is absorbed by the
//! task queue's uniqueness key.
//!
//! # Example
//!
//! ```ignore
//! use darkroom_core::watcher::{DirectoryWatcher, WatcherConfig};
//!
//! let watcher = DirectoryWatcher::new(root, WatcherConfig::default(), sink)?;
//! watcher.start().await;
//! // ...
//! watcher.stop().await;
//! ```

mod config;
mod error;
mod poll;
mod push;
mod stability;
mod state;
mod traits;
mod types;
mod watch;

pub use config::WatcherConfig;
pub use error::WatcherError;
pub use state::WatchState;
pub use traits::{DetectionSink, DispatchError};
pub use types::{DetectedFile, PendingFile, WatcherStatus};
pub use watch::DirectoryWatcher;

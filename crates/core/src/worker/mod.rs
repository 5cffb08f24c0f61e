//! Worker pool that executes queued ingestion tasks.
//!
//! A fixed set of workers lease tasks from the queue, run the registered
//! handler under a hard timeout, and record the outcome: ack on success,
//! schedule a backed-off retry on failure, archive and hand the task to the
//! failure sink once attempts are exhausted.

mod config;
mod pool;
mod traits;

pub use config::WorkerConfig;
pub use pool::WorkerPool;
pub use traits::{FailureSink, FailureStage, HandlerError, TaskHandler};

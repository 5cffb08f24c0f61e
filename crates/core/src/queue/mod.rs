//! Durable, deduplicating task queue and the dispatcher that feeds it.
//!
//! The queue is a minimal capability set (enqueue with a uniqueness key,
//! weighted lease, ack/fail, pause/resume, stats) behind the [`TaskQueue`]
//! trait, so it can sit on an in-memory heap (tests, single-process
//! deployments) or a SQLite database (survives restarts). Duplicate enqueue
//! of an outstanding uniqueness key within the TTL window is a silent no-op,
//! which is what absorbs the watcher's two racing detectors.

mod config;
mod dispatcher;
mod error;
mod memory;
mod sqlite;
mod traits;
mod types;

pub use config::{QueueConfig, QueueWeight};
pub use dispatcher::TaskDispatcher;
pub use error::QueueError;
pub use memory::MemoryTaskQueue;
pub use sqlite::SqliteTaskQueue;
pub use traits::TaskQueue;
pub use types::{
    Enqueued, IngestPayload, NewTask, QueueStats, Task, TaskState, TASK_TYPE_MEDIA_INGEST,
};

//! Trait definition for task queue backends.

use chrono::{DateTime, Utc};

use super::error::QueueError;
use super::types::{Enqueued, NewTask, QueueStats, Task};

/// Minimal capability set a task queue backend must provide.
///
/// Delivery contract: at-least-once, with collapsing of simultaneous
/// duplicates via the uniqueness key, not global exactly-once. Handlers
/// must tolerate seeing the same file again over time.
///
/// Methods are synchronous and must not block for long; both provided
/// backends only take short in-process locks.
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task. When an outstanding task with the same uniqueness
    /// key exists within the dedup TTL window, returns
    /// [`Enqueued::Duplicate`] without enqueuing. That is a successful
    /// no-op, never an error.
    fn enqueue(&self, task: NewTask) -> Result<Enqueued, QueueError>;

    /// Leases the next task, rotating through queues by weight and skipping
    /// paused queues. Promotes due scheduled tasks first. Returns `None`
    /// when nothing is leasable.
    fn lease(&self) -> Result<Option<Task>, QueueError>;

    /// Marks a leased task as completed and releases its uniqueness key.
    fn ack(&self, task_id: &str) -> Result<(), QueueError>;

    /// Records a failed execution. With `retry_at`, the task is scheduled
    /// for another attempt; without, it is archived and its uniqueness key
    /// released.
    fn fail(
        &self,
        task_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError>;

    /// Halts leasing from a queue without disturbing in-flight tasks.
    fn pause(&self, queue: &str) -> Result<(), QueueError>;

    /// Re-enables leasing from a queue.
    fn resume(&self, queue: &str) -> Result<(), QueueError>;

    /// Per-queue counters.
    fn stats(&self) -> Result<Vec<QueueStats>, QueueError>;

    /// Drops uniqueness-key records whose TTL has lapsed and whose task is
    /// no longer outstanding. Returns the number purged.
    fn purge_expired(&self) -> Result<usize, QueueError>;
}

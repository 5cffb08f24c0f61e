//! In-memory task queue backend.
//!
//! The reference implementation of the [`TaskQueue`] semantics: used by
//! tests and by single-process deployments that can afford to lose queued
//! work on restart (the watcher's initial scan rediscovers it anyway).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;
use uuid::Uuid;

use super::config::QueueConfig;
use super::error::QueueError;
use super::traits::TaskQueue;
use super::types::{Enqueued, NewTask, QueueStats, Task, TaskState};

struct TaskRecord {
    task: Task,
    state: TaskState,
    retry_at: Option<DateTime<Utc>>,
}

struct KeyEntry {
    task_id: String,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskRecord>,
    /// Pending task ids per queue, in FIFO order.
    ready: HashMap<String, VecDeque<String>>,
    /// Uniqueness key -> owning task.
    keys: HashMap<String, KeyEntry>,
    paused: HashSet<String>,
    /// Position in the lease schedule where the next scan starts.
    cursor: usize,
}

/// Mutex-guarded in-memory [`TaskQueue`].
pub struct MemoryTaskQueue {
    config: QueueConfig,
    schedule: Vec<String>,
    inner: Mutex<Inner>,
}

impl MemoryTaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        let schedule = config.lease_schedule();
        Self {
            config,
            schedule,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn dedup_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.dedup_ttl_secs as i64)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens if a holder panicked; the data is
        // still consistent enough for counters and drains.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskQueue for MemoryTaskQueue {
    fn enqueue(&self, new_task: NewTask) -> Result<Enqueued, QueueError> {
        if !self.config.has_queue(&new_task.queue) {
            return Err(QueueError::UnknownQueue(new_task.queue));
        }

        let now = Utc::now();
        let mut inner = self.lock();

        if let Some(entry) = inner.keys.get(&new_task.unique_key) {
            let outstanding = inner
                .tasks
                .get(&entry.task_id)
                .map(|record| record.state.is_outstanding())
                .unwrap_or(false);
            if outstanding && now - entry.inserted_at < self.dedup_window() {
                debug!(
                    "Enqueue collapsed: outstanding task for key {}",
                    new_task.unique_key
                );
                return Ok(Enqueued::Duplicate);
            }
        }

        let id = Uuid::new_v4().to_string();
        let task = Task {
            id: id.clone(),
            task_type: new_task.task_type,
            queue: new_task.queue.clone(),
            unique_key: new_task.unique_key.clone(),
            payload: new_task.payload,
            attempts: 0,
            max_attempts: new_task.max_attempts,
            timeout_secs: new_task.timeout_secs,
            enqueued_at: now,
            last_error: None,
        };

        inner.keys.insert(
            new_task.unique_key,
            KeyEntry {
                task_id: id.clone(),
                inserted_at: now,
            },
        );
        inner.tasks.insert(
            id.clone(),
            TaskRecord {
                task,
                state: TaskState::Pending,
                retry_at: None,
            },
        );
        inner
            .ready
            .entry(new_task.queue)
            .or_default()
            .push_back(id.clone());

        Ok(Enqueued::Accepted(id))
    }

    fn lease(&self) -> Result<Option<Task>, QueueError> {
        let now = Utc::now();
        let mut inner = self.lock();

        // Promote scheduled tasks whose retry time has come.
        let due: Vec<String> = inner
            .tasks
            .iter()
            .filter(|(_, record)| {
                record.state == TaskState::Scheduled
                    && record.retry_at.map(|at| at <= now).unwrap_or(true)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in due {
            if let Some(record) = inner.tasks.get_mut(&id) {
                record.state = TaskState::Pending;
                record.retry_at = None;
                let queue = record.task.queue.clone();
                inner.ready.entry(queue).or_default().push_back(id);
            }
        }

        if self.schedule.is_empty() {
            return Ok(None);
        }

        for step in 0..self.schedule.len() {
            let idx = (inner.cursor + step) % self.schedule.len();
            let queue = &self.schedule[idx];
            if inner.paused.contains(queue) {
                continue;
            }
            let leased = inner.ready.get_mut(queue).and_then(|q| q.pop_front());
            if let Some(id) = leased {
                inner.cursor = (idx + 1) % self.schedule.len();
                if let Some(record) = inner.tasks.get_mut(&id) {
                    record.state = TaskState::Active;
                    return Ok(Some(record.task.clone()));
                }
            }
        }

        Ok(None)
    }

    fn ack(&self, task_id: &str) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let unique_key = {
            let record = inner
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
            record.state = TaskState::Completed;
            record.task.unique_key.clone()
        };
        release_key(&mut inner, &unique_key, task_id);
        Ok(())
    }

    fn fail(
        &self,
        task_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let released = {
            let record = inner
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
            record.task.attempts += 1;
            record.task.last_error = Some(error.to_string());
            match retry_at {
                Some(at) => {
                    record.state = TaskState::Scheduled;
                    record.retry_at = Some(at);
                    None
                }
                None => {
                    record.state = TaskState::Archived;
                    record.retry_at = None;
                    Some(record.task.unique_key.clone())
                }
            }
        };
        if let Some(key) = released {
            release_key(&mut inner, &key, task_id);
        }
        Ok(())
    }

    fn pause(&self, queue: &str) -> Result<(), QueueError> {
        if !self.config.has_queue(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        self.lock().paused.insert(queue.to_string());
        Ok(())
    }

    fn resume(&self, queue: &str) -> Result<(), QueueError> {
        if !self.config.has_queue(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        self.lock().paused.remove(queue);
        Ok(())
    }

    fn stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        let inner = self.lock();
        let mut out = Vec::with_capacity(self.config.queues.len());
        for queue in &self.config.queues {
            let mut stats = QueueStats {
                queue: queue.name.clone(),
                paused: inner.paused.contains(&queue.name),
                pending: 0,
                active: 0,
                scheduled: 0,
                retry: 0,
                archived: 0,
                completed: 0,
            };
            for record in inner.tasks.values() {
                if record.task.queue != queue.name {
                    continue;
                }
                match record.state {
                    TaskState::Pending => stats.pending += 1,
                    TaskState::Active => stats.active += 1,
                    TaskState::Scheduled if record.task.attempts == 0 => stats.scheduled += 1,
                    TaskState::Scheduled => stats.retry += 1,
                    TaskState::Archived => stats.archived += 1,
                    TaskState::Completed => stats.completed += 1,
                }
            }
            out.push(stats);
        }
        Ok(out)
    }

    fn purge_expired(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let window = self.dedup_window();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .keys
            .iter()
            .filter(|(_, entry)| {
                let outstanding = inner
                    .tasks
                    .get(&entry.task_id)
                    .map(|record| record.state.is_outstanding())
                    .unwrap_or(false);
                !outstanding && now - entry.inserted_at >= window
            })
            .map(|(key, _)| key.clone())
            .collect();
        let purged = expired.len();
        for key in expired {
            inner.keys.remove(&key);
        }
        Ok(purged)
    }
}

fn release_key(inner: &mut Inner, key: &str, task_id: &str) {
    // Only release if the key still points at this task; a newer version of
    // the same file may have claimed it since.
    if inner
        .keys
        .get(key)
        .map(|entry| entry.task_id == task_id)
        .unwrap_or(false)
    {
        inner.keys.remove(key);
    }
}

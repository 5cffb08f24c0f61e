//! SQLite-backed task queue implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::config::QueueConfig;
use super::error::QueueError;
use super::traits::TaskQueue;
use super::types::{Enqueued, NewTask, QueueStats, Task, TaskState};

struct Inner {
    conn: Connection,
    /// Position in the lease schedule where the next scan starts.
    cursor: usize,
}

/// SQLite-backed [`TaskQueue`]. Queued work and queue pause flags survive
/// process restarts.
pub struct SqliteTaskQueue {
    config: QueueConfig,
    schedule: Vec<String>,
    inner: Mutex<Inner>,
}

impl SqliteTaskQueue {
    /// Opens (or creates) the database file and its tables. Tasks left
    /// active by an interrupted process are put back on offer.
    pub fn new(path: &Path, config: QueueConfig) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Self::recover_interrupted(&conn)?;
        Ok(Self::from_conn(conn, config))
    }

    /// Creates an in-memory queue (useful for testing).
    pub fn in_memory(config: QueueConfig) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self::from_conn(conn, config))
    }

    fn from_conn(conn: Connection, config: QueueConfig) -> Self {
        let schedule = config.lease_schedule();
        Self {
            config,
            schedule,
            inner: Mutex::new(Inner { conn, cursor: 0 }),
        }
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                queue TEXT NOT NULL,
                unique_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                timeout_secs INTEGER NOT NULL,
                enqueued_at TEXT NOT NULL,
                retry_at TEXT,
                last_error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_queue_state ON tasks(queue, state);
            CREATE INDEX IF NOT EXISTS idx_tasks_unique_key ON tasks(unique_key);

            CREATE TABLE IF NOT EXISTS queue_control (
                queue TEXT PRIMARY KEY,
                paused INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Resets `active` rows back to `pending`. This connection owns the
    /// database, so an active row at open time belongs to a worker that no
    /// longer exists; left alone it would never be leased again, while still
    /// holding its uniqueness key against re-enqueues.
    fn recover_interrupted(conn: &Connection) -> Result<(), QueueError> {
        let recovered = conn
            .execute(
                "UPDATE tasks SET state = 'pending' WHERE state = 'active'",
                [],
            )
            .map_err(db_err)?;
        if recovered > 0 {
            warn!("Recovered {} interrupted task(s) back to pending", recovered);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn paused_queues(conn: &Connection) -> Result<HashSet<String>, QueueError> {
        let mut stmt = conn
            .prepare("SELECT queue FROM queue_control WHERE paused = 1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut paused = HashSet::new();
        for row in rows {
            paused.insert(row.map_err(db_err)?);
        }
        Ok(paused)
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let payload_json: String = row.get(4)?;
        let enqueued_at_str: String = row.get(9)?;
        Ok(Task {
            id: row.get(0)?,
            task_type: row.get(1)?,
            queue: row.get(2)?,
            unique_key: row.get(3)?,
            payload: serde_json::from_str(&payload_json)
                .unwrap_or(serde_json::Value::Null),
            attempts: row.get(5)?,
            max_attempts: row.get(6)?,
            timeout_secs: row.get(7)?,
            enqueued_at: parse_timestamp(&enqueued_at_str),
            last_error: row.get(8)?,
        })
    }
}

const TASK_COLUMNS: &str = "id, task_type, queue, unique_key, payload, \
                            attempts, max_attempts, timeout_secs, last_error, enqueued_at";

impl TaskQueue for SqliteTaskQueue {
    fn enqueue(&self, new_task: NewTask) -> Result<Enqueued, QueueError> {
        if !self.config.has_queue(&new_task.queue) {
            return Err(QueueError::UnknownQueue(new_task.queue));
        }

        let now = Utc::now();
        let cutoff = format_timestamp(now - chrono::Duration::seconds(self.config.dedup_ttl_secs as i64));
        let inner = self.lock();

        let outstanding: Option<String> = inner
            .conn
            .query_row(
                "SELECT id FROM tasks
                 WHERE unique_key = ?1
                   AND state IN ('pending', 'active', 'scheduled')
                   AND enqueued_at >= ?2
                 LIMIT 1",
                params![new_task.unique_key, cutoff],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if outstanding.is_some() {
            return Ok(Enqueued::Duplicate);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&new_task.payload)?;
        inner
            .conn
            .execute(
                "INSERT INTO tasks
                 (id, task_type, queue, unique_key, payload, state,
                  attempts, max_attempts, timeout_secs, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?7, ?8)",
                params![
                    id,
                    new_task.task_type,
                    new_task.queue,
                    new_task.unique_key,
                    payload,
                    new_task.max_attempts,
                    new_task.timeout_secs,
                    format_timestamp(now),
                ],
            )
            .map_err(db_err)?;

        Ok(Enqueued::Accepted(id))
    }

    fn lease(&self) -> Result<Option<Task>, QueueError> {
        let now = format_timestamp(Utc::now());
        let mut inner = self.lock();

        inner
            .conn
            .execute(
                "UPDATE tasks SET state = 'pending', retry_at = NULL
                 WHERE state = 'scheduled' AND (retry_at IS NULL OR retry_at <= ?1)",
                params![now],
            )
            .map_err(db_err)?;

        if self.schedule.is_empty() {
            return Ok(None);
        }

        let paused = Self::paused_queues(&inner.conn)?;
        for step in 0..self.schedule.len() {
            let idx = (inner.cursor + step) % self.schedule.len();
            let queue = &self.schedule[idx];
            if paused.contains(queue) {
                continue;
            }
            let task: Option<Task> = inner
                .conn
                .query_row(
                    &format!(
                        "SELECT {} FROM tasks
                         WHERE queue = ?1 AND state = 'pending'
                         ORDER BY enqueued_at
                         LIMIT 1",
                        TASK_COLUMNS
                    ),
                    params![queue],
                    Self::row_to_task,
                )
                .optional()
                .map_err(db_err)?;
            if let Some(task) = task {
                inner
                    .conn
                    .execute(
                        "UPDATE tasks SET state = 'active' WHERE id = ?1",
                        params![task.id],
                    )
                    .map_err(db_err)?;
                inner.cursor = (idx + 1) % self.schedule.len();
                return Ok(Some(task));
            }
        }

        Ok(None)
    }

    fn ack(&self, task_id: &str) -> Result<(), QueueError> {
        let inner = self.lock();
        let changed = inner
            .conn
            .execute(
                "UPDATE tasks SET state = 'completed' WHERE id = ?1",
                params![task_id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(QueueError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    fn fail(
        &self,
        task_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), QueueError> {
        let inner = self.lock();
        let changed = match retry_at {
            Some(at) => inner
                .conn
                .execute(
                    "UPDATE tasks
                     SET state = 'scheduled', retry_at = ?2,
                         attempts = attempts + 1, last_error = ?3
                     WHERE id = ?1",
                    params![task_id, format_timestamp(at), error],
                )
                .map_err(db_err)?,
            None => inner
                .conn
                .execute(
                    "UPDATE tasks
                     SET state = 'archived', retry_at = NULL,
                         attempts = attempts + 1, last_error = ?2
                     WHERE id = ?1",
                    params![task_id, error],
                )
                .map_err(db_err)?,
        };
        if changed == 0 {
            return Err(QueueError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    fn pause(&self, queue: &str) -> Result<(), QueueError> {
        if !self.config.has_queue(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        self.lock()
            .conn
            .execute(
                "INSERT INTO queue_control (queue, paused) VALUES (?1, 1)
                 ON CONFLICT(queue) DO UPDATE SET paused = 1",
                params![queue],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn resume(&self, queue: &str) -> Result<(), QueueError> {
        if !self.config.has_queue(queue) {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        }
        self.lock()
            .conn
            .execute(
                "INSERT INTO queue_control (queue, paused) VALUES (?1, 0)
                 ON CONFLICT(queue) DO UPDATE SET paused = 0",
                params![queue],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn stats(&self) -> Result<Vec<QueueStats>, QueueError> {
        let inner = self.lock();
        let paused = Self::paused_queues(&inner.conn)?;
        let mut out = Vec::with_capacity(self.config.queues.len());
        for queue in &self.config.queues {
            let mut stats = QueueStats {
                queue: queue.name.clone(),
                paused: paused.contains(&queue.name),
                pending: 0,
                active: 0,
                scheduled: 0,
                retry: 0,
                archived: 0,
                completed: 0,
            };
            let mut stmt = inner
                .conn
                .prepare(
                    "SELECT state, attempts > 0, COUNT(*)
                     FROM tasks WHERE queue = ?1
                     GROUP BY state, attempts > 0",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![queue.name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, usize>(2)?,
                    ))
                })
                .map_err(db_err)?;
            for row in rows {
                let (state, retried, count) = row.map_err(db_err)?;
                match TaskState::parse(&state) {
                    Some(TaskState::Pending) => stats.pending += count,
                    Some(TaskState::Active) => stats.active += count,
                    Some(TaskState::Scheduled) if retried => stats.retry += count,
                    Some(TaskState::Scheduled) => stats.scheduled += count,
                    Some(TaskState::Archived) => stats.archived += count,
                    Some(TaskState::Completed) => stats.completed += count,
                    None => {}
                }
            }
            out.push(stats);
        }
        Ok(out)
    }

    fn purge_expired(&self) -> Result<usize, QueueError> {
        // Terminal rows double as the dedup key records here; pruning the
        // stale ones bounds table growth.
        let cutoff = format_timestamp(
            Utc::now() - chrono::Duration::seconds(self.config.dedup_ttl_secs as i64),
        );
        let inner = self.lock();
        let purged = inner
            .conn
            .execute(
                "DELETE FROM tasks
                 WHERE state IN ('archived', 'completed') AND enqueued_at < ?1",
                params![cutoff],
            )
            .map_err(db_err)?;
        Ok(purged)
    }
}

/// Fixed-width RFC 3339 so textual comparison in SQL matches chronological
/// order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn db_err(e: rusqlite::Error) -> QueueError {
    QueueError::Backend(e.to_string())
}

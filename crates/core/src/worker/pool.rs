//! The worker pool implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::{Task, TaskQueue};

use super::config::WorkerConfig;
use super::traits::{FailureSink, FailureStage, HandlerError, TaskHandler};

/// A pool of workers leasing tasks from a shared queue.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    failure_sink: Option<Arc<dyn FailureSink>>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pool_id: String,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, config: WorkerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let pool_id = Uuid::new_v4().to_string()[..8].to_string();
        Self {
            queue,
            config,
            handlers: HashMap::new(),
            failure_sink: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            pool_id,
        }
    }

    /// Registers a handler for its task type. Call before `start`.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .insert(handler.task_type().to_string(), handler);
    }

    /// Sets the sink notified when a task exhausts its attempts.
    pub fn set_failure_sink(&mut self, sink: Arc<dyn FailureSink>) {
        self.failure_sink = Some(sink);
    }

    /// Start the pool (spawns one task per worker).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(
            "Starting worker pool {} with {} workers",
            self.pool_id, self.config.concurrency
        );

        let handlers = Arc::new(self.handlers.clone());
        let mut handles = self.handles.lock().await;
        for idx in 0..self.config.concurrency {
            let worker = Worker {
                id: format!("{}-{}", self.pool_id, idx),
                queue: Arc::clone(&self.queue),
                config: self.config.clone(),
                handlers: Arc::clone(&handlers),
                failure_sink: self.failure_sink.clone(),
                running: Arc::clone(&self.running),
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker.run(shutdown_rx)));
        }
    }

    /// Stop the pool, waiting for in-flight tasks up to the configured
    /// shutdown timeout. Workers are never aborted mid-task.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool {}", self.pool_id);
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        let drained = futures::future::join_all(handles);
        if tokio::time::timeout(self.config.shutdown_timeout(), drained)
            .await
            .is_err()
        {
            warn!(
                "Worker pool {} did not finish in-flight tasks within {:?}",
                self.pool_id,
                self.config.shutdown_timeout()
            );
        } else {
            info!("Worker pool {} stopped", self.pool_id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

struct Worker {
    id: String,
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    running: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!("Worker {} started", self.id);
        loop {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            let leased = match self.queue.lease() {
                Ok(task) => task,
                Err(e) => {
                    warn!("Worker {} lease error: {}", self.id, e);
                    None
                }
            };

            match leased {
                Some(task) => self.execute(task).await,
                None => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.config.lease_poll()) => {}
                    }
                }
            }
        }
        debug!("Worker {} stopped", self.id);
    }

    async fn execute(&self, task: Task) {
        let Some(handler) = self.handlers.get(&task.task_type) else {
            warn!(
                "Worker {}: no handler for task type {}, archiving task {}",
                self.id, task.task_type, task.id
            );
            if let Err(e) = self.queue.fail(
                &task.id,
                &format!("no handler registered for {}", task.task_type),
                None,
            ) {
                warn!("Worker {}: failed to archive task {}: {}", self.id, task.id, e);
            }
            return;
        };

        let attempt = task.attempts + 1;
        debug!(
            "Worker {} executing task {} (attempt {}/{})",
            self.id, task.id, attempt, task.max_attempts
        );

        let timeout = Duration::from_secs(task.timeout_secs);
        let outcome = match tokio::time::timeout(timeout, handler.handle(&task)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::new(
                FailureStage::Timeout,
                format!("gave up after {}s", task.timeout_secs),
            )),
        };

        match outcome {
            Ok(()) => {
                info!("Worker {} completed task {}", self.id, task.id);
                if let Err(e) = self.queue.ack(&task.id) {
                    warn!("Worker {}: failed to ack task {}: {}", self.id, task.id, e);
                }
            }
            Err(error) if attempt >= task.max_attempts => {
                warn!(
                    "Task {} failed on final attempt {}/{}: {}",
                    task.id, attempt, task.max_attempts, error
                );
                if let Err(e) = self.queue.fail(&task.id, &error.to_string(), None) {
                    warn!("Worker {}: failed to archive task {}: {}", self.id, task.id, e);
                }
                if let Some(sink) = &self.failure_sink {
                    sink.on_exhausted(&task, attempt, &error, &self.id).await;
                }
            }
            Err(error) => {
                let delay = self.config.backoff(attempt);
                warn!(
                    "Task {} failed (attempt {}/{}), retrying in {:?}: {}",
                    task.id, attempt, task.max_attempts, delay, error
                );
                let retry_at = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
                if let Err(e) = self
                    .queue
                    .fail(&task.id, &error.to_string(), Some(retry_at))
                {
                    warn!(
                        "Worker {}: failed to schedule retry for task {}: {}",
                        self.id, task.id, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Enqueued, MemoryTaskQueue, NewTask, QueueConfig, TASK_TYPE_MEDIA_INGEST};
    use crate::testing::{MockHandler, RecordingFailureSink};

    fn new_task(key: &str, max_attempts: u32, timeout_secs: u64) -> NewTask {
        NewTask {
            task_type: TASK_TYPE_MEDIA_INGEST.to_string(),
            queue: "ingest".to_string(),
            unique_key: key.to_string(),
            payload: serde_json::json!({"file_path": key}),
            max_attempts,
            timeout_secs,
        }
    }

    fn fast_config(concurrency: usize) -> WorkerConfig {
        WorkerConfig {
            concurrency,
            lease_poll_ms: 10,
            backoff_base_secs: 0,
            backoff_cap_secs: 0,
            shutdown_timeout_secs: 5,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 3s");
    }

    #[tokio::test]
    async fn test_tasks_complete_and_ack() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let handler = Arc::new(MockHandler::new());
        queue
            .enqueue(new_task("/media/a.jpg", 3, 600))
            .unwrap();
        queue
            .enqueue(new_task("/media/b.jpg", 3, 600))
            .unwrap();

        let mut pool = WorkerPool::new(queue.clone(), fast_config(2));
        pool.register(handler.clone());
        pool.start().await;

        let q = queue.clone();
        wait_for(move || q.stats().unwrap()[0].completed == 2).await;
        pool.stop().await;

        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_task_is_archived_and_reported() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let handler = Arc::new(MockHandler::always_failing(
            FailureStage::Hash,
            "truncated file",
        ));
        let sink = Arc::new(RecordingFailureSink::new());
        queue
            .enqueue(new_task("/media/bad.jpg", 3, 600))
            .unwrap();

        let mut pool = WorkerPool::new(queue.clone(), fast_config(1));
        pool.register(handler.clone());
        pool.set_failure_sink(sink.clone());
        pool.start().await;

        let s = sink.clone();
        wait_for(move || !s.exhausted().is_empty()).await;
        pool.stop().await;

        let exhausted = sink.exhausted();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].attempts, 3);
        assert_eq!(exhausted[0].stage, FailureStage::Hash);
        assert_eq!(handler.calls(), 3);
        assert_eq!(queue.stats().unwrap()[0].archived, 1);
    }

    #[tokio::test]
    async fn test_recovery_after_transient_failures() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let handler = Arc::new(MockHandler::new().with_script(vec![
            Err(HandlerError::new(FailureStage::Database, "locked")),
            Ok(()),
        ]));
        queue
            .enqueue(new_task("/media/a.jpg", 3, 600))
            .unwrap();

        let mut pool = WorkerPool::new(queue.clone(), fast_config(1));
        pool.register(handler.clone());
        pool.start().await;

        let q = queue.clone();
        wait_for(move || q.stats().unwrap()[0].completed == 1).await;
        pool.stop().await;

        assert_eq!(handler.calls(), 2);
        assert_eq!(queue.stats().unwrap()[0].archived, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let handler = Arc::new(MockHandler::new().with_delay(Duration::from_secs(30)));
        let sink = Arc::new(RecordingFailureSink::new());
        queue.enqueue(new_task("/media/slow.jpg", 1, 0)).unwrap();

        let mut pool = WorkerPool::new(queue.clone(), fast_config(1));
        pool.register(handler.clone());
        pool.set_failure_sink(sink.clone());
        pool.start().await;

        let s = sink.clone();
        wait_for(move || !s.exhausted().is_empty()).await;
        pool.stop().await;

        let exhausted = sink.exhausted();
        assert_eq!(exhausted[0].stage, FailureStage::Timeout);
        assert_eq!(exhausted[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_unhandled_task_type_is_archived() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let enqueued = queue
            .enqueue(NewTask {
                task_type: "media:transcode".to_string(),
                queue: "ingest".to_string(),
                unique_key: "/media/a.mp4".to_string(),
                payload: serde_json::Value::Null,
                max_attempts: 3,
                timeout_secs: 600,
            })
            .unwrap();
        assert!(matches!(enqueued, Enqueued::Accepted(_)));

        let mut pool = WorkerPool::new(queue.clone(), fast_config(1));
        pool.register(Arc::new(MockHandler::new()));
        pool.start().await;

        let q = queue.clone();
        wait_for(move || q.stats().unwrap()[0].archived == 1).await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_task() {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let handler = Arc::new(MockHandler::new().with_delay(Duration::from_millis(200)));
        queue.enqueue(new_task("/media/a.jpg", 3, 600)).unwrap();

        let mut pool = WorkerPool::new(queue.clone(), fast_config(1));
        pool.register(handler.clone());
        pool.start().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.stop().await;

        assert_eq!(queue.stats().unwrap()[0].completed, 1);
        assert!(!pool.is_running());
    }
}

//! Ingestion service implementation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{validate_config, Config};
use crate::quarantine::{FailedEntry, QuarantineManager};
use crate::queue::{
    MemoryTaskQueue, SqliteTaskQueue, TaskDispatcher, TaskQueue,
};
use crate::watcher::{DetectedFile, DirectoryWatcher};
use crate::worker::{TaskHandler, WorkerPool};

use super::types::{IngestError, IngestStatus};

/// The assembled ingestion pipeline.
///
/// Detections flow watcher -> dispatcher -> queue -> worker pool; exhausted
/// tasks land in quarantine. The service owns the lifecycle of all of them.
pub struct IngestService {
    queue: Arc<dyn TaskQueue>,
    dispatcher: Arc<TaskDispatcher>,
    watcher: DirectoryWatcher,
    pool: WorkerPool,
    quarantine: Arc<QuarantineManager>,
    running: AtomicBool,
}

impl IngestService {
    /// Builds the pipeline from configuration. The handler executes
    /// ingestion tasks; everything else is wiring.
    pub fn new(config: Config, handler: Arc<dyn TaskHandler>) -> Result<Self, IngestError> {
        validate_config(&config)?;

        let queue: Arc<dyn TaskQueue> = match &config.ingest.database_path {
            Some(path) => Arc::new(SqliteTaskQueue::new(path, config.queue.clone())?),
            None => Arc::new(MemoryTaskQueue::new(config.queue.clone())),
        };

        Self::with_queue(config, handler, queue)
    }

    /// Builds the pipeline on a caller-provided queue backend.
    pub fn with_queue(
        config: Config,
        handler: Arc<dyn TaskHandler>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, IngestError> {
        validate_config(&config)?;

        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::clone(&queue),
            config.queue.clone(),
        ));
        let watcher = DirectoryWatcher::new(
            config.ingest.root.clone(),
            config.watcher.clone(),
            dispatcher.clone(),
        )?;
        let quarantine = Arc::new(QuarantineManager::new(
            config.quarantine.clone(),
            config.ingest.root.clone(),
        ));

        let mut pool = WorkerPool::new(Arc::clone(&queue), config.worker.clone());
        pool.register(handler);
        pool.set_failure_sink(quarantine.clone());

        Ok(Self {
            queue,
            dispatcher,
            watcher,
            pool,
            quarantine,
            running: AtomicBool::new(false),
        })
    }

    /// Starts the watcher and the worker pool.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Ingestion service already running");
            return;
        }
        info!("Starting ingestion service");
        self.pool.start().await;
        self.watcher.start().await;
    }

    /// Stops detection first, then drains the workers.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping ingestion service");
        self.watcher.stop().await;
        self.pool.stop().await;
        info!("Ingestion service stopped");
    }

    pub async fn status(&self) -> Result<IngestStatus, IngestError> {
        Ok(IngestStatus {
            running: self.running.load(Ordering::Relaxed),
            watcher: self.watcher.status().await,
            queues: self.queue.stats()?,
        })
    }

    /// Halts leasing from a queue; in-flight tasks finish normally.
    pub fn pause_queue(&self, queue: &str) -> Result<(), IngestError> {
        self.queue.pause(queue)?;
        info!("Paused queue {}", queue);
        Ok(())
    }

    pub fn resume_queue(&self, queue: &str) -> Result<(), IngestError> {
        self.queue.resume(queue)?;
        info!("Resumed queue {}", queue);
        Ok(())
    }

    /// Lists quarantined files, newest first.
    pub async fn list_failed(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FailedEntry>, IngestError> {
        Ok(self.quarantine.list(limit, offset).await?)
    }

    /// Restores a quarantined file and enqueues it on the retry queue.
    ///
    /// The restored file is dispatched directly rather than waiting for the
    /// watcher: its modification time is often unchanged, and the watcher
    /// deliberately ignores versions it has already reported.
    pub async fn retry_failed(&self, path: &Path) -> Result<PathBuf, IngestError> {
        let restored = self.quarantine.retry(path).await?;
        let size = tokio::fs::metadata(&restored)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        self.dispatcher
            .submit(&DetectedFile::retry(restored.clone(), size))?;
        Ok(restored)
    }

    /// Permanently removes a quarantined file and its sidecar.
    pub async fn delete_failed(&self, path: &Path) -> Result<(), IngestError> {
        Ok(self.quarantine.delete(path).await?)
    }

    /// Drops expired dedup records; intended for periodic maintenance.
    pub fn purge_expired(&self) -> Result<usize, IngestError> {
        Ok(self.queue.purge_expired()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::quarantine::QuarantineRecord;
    use crate::testing::MockHandler;
    use crate::worker::FailureStage;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.ingest.root = dir.path().join("ingest");
        config.quarantine.root = dir.path().join("quarantine");
        std::fs::create_dir_all(&config.ingest.root).unwrap();
        config
    }

    fn service(dir: &TempDir) -> IngestService {
        IngestService::new(test_config(dir), Arc::new(MockHandler::new())).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.quarantine.root = config.ingest.root.join("quarantine");
        let result = IngestService::new(config, Arc::new(MockHandler::new()));
        assert!(matches!(
            result,
            Err(IngestError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let status = service.status().await.unwrap();
        assert!(!status.running);
        assert!(!status.watcher.running);
        assert_eq!(status.queues.len(), 2);
    }

    #[tokio::test]
    async fn test_pause_and_resume_reflect_in_status() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.pause_queue("ingest").unwrap();
        let status = service.status().await.unwrap();
        assert!(status.queues[0].paused);

        service.resume_queue("ingest").unwrap();
        let status = service.status().await.unwrap();
        assert!(!status.queues[0].paused);
    }

    #[tokio::test]
    async fn test_retry_failed_restores_and_enqueues() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let original = config.ingest.root.join("photo.jpg");
        std::fs::write(&original, b"jpeg bytes").unwrap();

        let manager = QuarantineManager::new(
            config.quarantine.clone(),
            config.ingest.root.clone(),
        );
        let record = QuarantineRecord {
            original_path: PathBuf::from("photo.jpg"),
            error: "hash: truncated file".to_string(),
            stage: FailureStage::Hash,
            attempts: 3,
            timestamp: Utc::now(),
            worker_id: "test-0".to_string(),
            stack_trace: None,
        };
        let quarantined = manager.quarantine(&original, &record).await.unwrap();

        let service = IngestService::new(config, Arc::new(MockHandler::new())).unwrap();
        let restored = service.retry_failed(&quarantined).await.unwrap();
        assert_eq!(restored, original);
        assert!(original.exists());

        // The retry was enqueued on the retry queue without the watcher.
        let status = service.status().await.unwrap();
        let retry_stats = status.queues.iter().find(|q| q.queue == "retry").unwrap();
        assert_eq!(retry_stats.pending, 1);

        assert!(service.list_failed(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failed() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let original = config.ingest.root.join("photo.jpg");
        std::fs::write(&original, b"jpeg bytes").unwrap();

        let manager = QuarantineManager::new(
            config.quarantine.clone(),
            config.ingest.root.clone(),
        );
        let record = QuarantineRecord {
            original_path: PathBuf::from("photo.jpg"),
            error: "metadata: no exif".to_string(),
            stage: FailureStage::Metadata,
            attempts: 3,
            timestamp: Utc::now(),
            worker_id: "test-0".to_string(),
            stack_trace: None,
        };
        let quarantined = manager.quarantine(&original, &record).await.unwrap();

        let service = IngestService::new(config, Arc::new(MockHandler::new())).unwrap();
        service.delete_failed(&quarantined).await.unwrap();
        assert!(!quarantined.exists());
        assert!(service.list_failed(10, 0).await.unwrap().is_empty());
    }
}

//! Routes detected files into queue tasks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::watcher::{DetectedFile, DetectionSink, DispatchError};

use super::config::QueueConfig;
use super::error::QueueError;
use super::traits::TaskQueue;
use super::types::{Enqueued, IngestPayload, NewTask, TASK_TYPE_MEDIA_INGEST};

/// Turns [`DetectedFile`] notifications into ingestion tasks.
///
/// First-time detections go to the ingest queue; operator-driven retries go
/// to the retry queue so a backlog of fresh files cannot starve them (nor
/// the other way round). The file's absolute path is the uniqueness key, so
/// a file reported by both detection mechanisms produces one task.
pub struct TaskDispatcher {
    queue: Arc<dyn TaskQueue>,
    config: QueueConfig,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, config: QueueConfig) -> Self {
        Self { queue, config }
    }

    /// Enqueues a task for the file. Collapsed duplicates are a silent
    /// success.
    pub fn submit(&self, file: &DetectedFile) -> Result<Enqueued, QueueError> {
        let queue = if file.is_retry {
            self.config.retry_queue.clone()
        } else {
            self.config.ingest_queue.clone()
        };
        let payload = IngestPayload {
            file_path: file.path.clone(),
            detected_at: file.detected_at,
            file_size: file.size,
            is_retry: file.is_retry,
        };
        let task = NewTask {
            task_type: TASK_TYPE_MEDIA_INGEST.to_string(),
            queue,
            unique_key: file.path.to_string_lossy().into_owned(),
            payload: serde_json::to_value(&payload)?,
            max_attempts: self.config.default_max_attempts,
            timeout_secs: self.config.default_timeout_secs,
        };

        let result = self.queue.enqueue(task)?;
        match &result {
            Enqueued::Accepted(id) => {
                info!("Enqueued ingestion task {} for {}", id, file.path.display());
            }
            Enqueued::Duplicate => {
                debug!(
                    "Detection collapsed into outstanding task: {}",
                    file.path.display()
                );
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl DetectionSink for TaskDispatcher {
    async fn dispatch(&self, file: DetectedFile) -> Result<(), DispatchError> {
        self.submit(&file)
            .map(|_| ())
            .map_err(|e| DispatchError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryTaskQueue;
    use std::path::PathBuf;

    fn dispatcher() -> (TaskDispatcher, Arc<MemoryTaskQueue>) {
        let queue = Arc::new(MemoryTaskQueue::new(QueueConfig::default()));
        let dispatcher = TaskDispatcher::new(queue.clone(), QueueConfig::default());
        (dispatcher, queue)
    }

    fn detected(path: &str) -> DetectedFile {
        DetectedFile::new(PathBuf::from(path), 1024)
    }

    #[test]
    fn test_detection_lands_on_ingest_queue() {
        let (dispatcher, queue) = dispatcher();
        let result = dispatcher.submit(&detected("/media/photo1.jpg")).unwrap();
        assert!(matches!(result, Enqueued::Accepted(_)));

        let task = queue.lease().unwrap().unwrap();
        assert_eq!(task.queue, "ingest");
        assert_eq!(task.task_type, TASK_TYPE_MEDIA_INGEST);
        assert_eq!(task.unique_key, "/media/photo1.jpg");

        let payload: IngestPayload = serde_json::from_value(task.payload).unwrap();
        assert_eq!(payload.file_path, PathBuf::from("/media/photo1.jpg"));
        assert!(!payload.is_retry);
    }

    #[test]
    fn test_retry_lands_on_retry_queue() {
        let (dispatcher, queue) = dispatcher();
        let file = DetectedFile::retry(PathBuf::from("/media/photo1.jpg"), 1024);
        dispatcher.submit(&file).unwrap();

        let task = queue.lease().unwrap().unwrap();
        assert_eq!(task.queue, "retry");
        let payload: IngestPayload = serde_json::from_value(task.payload).unwrap();
        assert!(payload.is_retry);
    }

    #[test]
    fn test_double_detection_is_one_task() {
        let (dispatcher, queue) = dispatcher();
        dispatcher.submit(&detected("/media/photo1.jpg")).unwrap();
        let second = dispatcher.submit(&detected("/media/photo1.jpg")).unwrap();
        assert!(second.is_duplicate());

        assert!(queue.lease().unwrap().is_some());
        assert!(queue.lease().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sink_dispatch() {
        let (dispatcher, queue) = dispatcher();
        let sink: &dyn DetectionSink = &dispatcher;
        sink.dispatch(detected("/media/photo1.jpg")).await.unwrap();
        assert!(queue.lease().unwrap().is_some());
    }
}

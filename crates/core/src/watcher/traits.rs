//! Trait definitions for the watcher module.

use async_trait::async_trait;

use super::types::DetectedFile;

/// Error returned by a [`DetectionSink`] when the hand-off fails.
///
/// The watcher treats any sink failure the same way: log it and leave the
/// file eligible for re-detection on a later cycle.
#[derive(Debug, thiserror::Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Receiver for confirmed-stable file detections.
///
/// Implemented by the task dispatcher in production and by collecting mocks
/// in tests. Keeps the watcher free of any queue types.
#[async_trait]
pub trait DetectionSink: Send + Sync {
    /// Hands one detection off for processing.
    async fn dispatch(&self, file: DetectedFile) -> Result<(), DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<DetectedFile>>,
    }

    #[async_trait]
    impl DetectionSink for RecordingSink {
        async fn dispatch(&self, file: DetectedFile) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(file);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_object_safety() {
        let sink: Box<dyn DetectionSink> = Box::new(RecordingSink {
            seen: Mutex::new(vec![]),
        });
        sink.dispatch(DetectedFile::new(PathBuf::from("/a"), 1))
            .await
            .unwrap();
    }
}

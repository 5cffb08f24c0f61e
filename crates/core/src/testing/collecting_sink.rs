//! Detection sink that records what it receives.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::watcher::{DetectedFile, DetectionSink, DispatchError};

/// A [`DetectionSink`] that collects every dispatched file for assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    detections: Mutex<Vec<DetectedFile>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub fn detections(&self) -> Vec<DetectedFile> {
        self.detections.lock().unwrap().clone()
    }
}

#[async_trait]
impl DetectionSink for CollectingSink {
    async fn dispatch(&self, file: DetectedFile) -> Result<(), DispatchError> {
        self.detections.lock().unwrap().push(file);
        Ok(())
    }
}

//! Failure sink that records exhausted tasks.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::queue::Task;
use crate::worker::{FailureSink, FailureStage, HandlerError};

/// One exhausted task, as seen by the sink.
#[derive(Debug, Clone)]
pub struct ExhaustedRecord {
    pub unique_key: String,
    pub attempts: u32,
    pub stage: FailureStage,
    pub error: String,
    pub worker_id: String,
}

/// A [`FailureSink`] that records every exhausted task for assertions.
#[derive(Debug, Default)]
pub struct RecordingFailureSink {
    records: Mutex<Vec<ExhaustedRecord>>,
}

impl RecordingFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, in order.
    pub fn exhausted(&self) -> Vec<ExhaustedRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureSink for RecordingFailureSink {
    async fn on_exhausted(
        &self,
        task: &Task,
        attempts: u32,
        error: &HandlerError,
        worker_id: &str,
    ) {
        self.records.lock().unwrap().push(ExhaustedRecord {
            unique_key: task.unique_key.clone(),
            attempts,
            stage: error.stage,
            error: error.to_string(),
            worker_id: worker_id.to_string(),
        });
    }
}

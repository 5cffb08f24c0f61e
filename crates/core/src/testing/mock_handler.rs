//! Mock task handler for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::queue::{Task, TASK_TYPE_MEDIA_INGEST};
use crate::worker::{FailureStage, HandlerError, TaskHandler};

/// Mock implementation of the [`TaskHandler`] trait.
///
/// Outcomes can be scripted per call; once the script runs out, the handler
/// falls back to its default outcome (success, or the configured failure).
/// An optional delay simulates slow handlers for timeout tests.
pub struct MockHandler {
    script: Mutex<VecDeque<Result<(), HandlerError>>>,
    default_error: Option<HandlerError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    handled_keys: Mutex<Vec<String>>,
}

impl Default for MockHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandler {
    /// A handler that succeeds on every call.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_error: None,
            delay: None,
            calls: AtomicUsize::new(0),
            handled_keys: Mutex::new(Vec::new()),
        }
    }

    /// A handler that fails every call with the given error.
    pub fn always_failing(stage: FailureStage, message: &str) -> Self {
        Self {
            default_error: Some(HandlerError::new(stage, message)),
            ..Self::new()
        }
    }

    /// Script the first calls' outcomes, consumed in order.
    pub fn with_script(mut self, outcomes: Vec<Result<(), HandlerError>>) -> Self {
        self.script = Mutex::new(outcomes.into());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Uniqueness keys of the tasks handled so far, in order.
    pub fn handled_keys(&self) -> Vec<String> {
        self.handled_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for MockHandler {
    fn task_type(&self) -> &str {
        TASK_TYPE_MEDIA_INGEST
    }

    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handled_keys
            .lock()
            .unwrap()
            .push(task.unique_key.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return outcome;
        }
        match &self.default_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

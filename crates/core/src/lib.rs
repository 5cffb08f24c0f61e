pub mod config;
pub mod ingest;
pub mod quarantine;
pub mod queue;
pub mod testing;
pub mod watcher;
pub mod worker;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use ingest::{IngestError, IngestService, IngestStatus};
pub use quarantine::{FailedEntry, QuarantineManager, QuarantineRecord};
pub use queue::{Enqueued, IngestPayload, Task, TaskDispatcher, TaskQueue};
pub use watcher::{DetectedFile, DetectionSink, DirectoryWatcher};
pub use worker::{FailureStage, HandlerError, TaskHandler, WorkerPool};

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - quarantine root is not inside the watched ingestion root
/// - queue weights are usable and the routing queues exist
/// - worker concurrency is at least 1
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // A quarantine inside the watched tree would be rediscovered by the
    // watcher and re-enqueued forever.
    if config.quarantine.root.starts_with(&config.ingest.root) {
        return Err(ConfigError::ValidationError(format!(
            "quarantine.root {} must not be inside ingest.root {}",
            config.quarantine.root.display(),
            config.ingest.root.display()
        )));
    }

    if config.queue.queues.is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.queues cannot be empty".to_string(),
        ));
    }
    for queue in &config.queue.queues {
        if queue.weight == 0 {
            return Err(ConfigError::ValidationError(format!(
                "queue {} has weight 0 and would never be leased from",
                queue.name
            )));
        }
    }
    for name in [&config.queue.ingest_queue, &config.queue.retry_queue] {
        if !config.queue.has_queue(name) {
            return Err(ConfigError::ValidationError(format!(
                "routing queue {} is not declared in queue.queues",
                name
            )));
        }
    }

    if config.worker.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "worker.concurrency cannot be 0".to_string(),
        ));
    }

    if config.watcher.poll_cycles_required == 0 {
        return Err(ConfigError::ValidationError(
            "watcher.poll_cycles_required cannot be 0".to_string(),
        ));
    }

    Ok(())
}

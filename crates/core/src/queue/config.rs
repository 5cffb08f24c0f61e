//! Configuration for the task queue and dispatcher.

use serde::{Deserialize, Serialize};

/// A named queue and its share of the lease schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueWeight {
    /// Queue name.
    pub name: String,
    /// Relative share of leases; must be non-zero.
    pub weight: u32,
}

/// Configuration for queue backends and the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queues and their lease weights. The defaults keep manual retries from
    /// starving first-time ingestion and vice versa.
    #[serde(default = "default_queues")]
    pub queues: Vec<QueueWeight>,

    /// Queue that first-time detections are enqueued on.
    #[serde(default = "default_ingest_queue")]
    pub ingest_queue: String,

    /// Queue that operator-driven retries are enqueued on.
    #[serde(default = "default_retry_queue")]
    pub retry_queue: String,

    /// Window within which an outstanding task with the same uniqueness key
    /// makes a new enqueue a no-op, in seconds.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// Attempts a task gets before it is archived and quarantined.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Hard per-task execution timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_queues() -> Vec<QueueWeight> {
    vec![
        QueueWeight {
            name: default_ingest_queue(),
            weight: 6,
        },
        QueueWeight {
            name: default_retry_queue(),
            weight: 3,
        },
    ]
}

fn default_ingest_queue() -> String {
    "ingest".to_string()
}

fn default_retry_queue() -> String {
    "retry".to_string()
}

fn default_dedup_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queues: default_queues(),
            ingest_queue: default_ingest_queue(),
            retry_queue: default_retry_queue(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            default_max_attempts: default_max_attempts(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

impl QueueConfig {
    /// Expands queue weights into a lease schedule: each queue name repeated
    /// `weight` times. Leasing rotates through this list.
    pub fn lease_schedule(&self) -> Vec<String> {
        let mut schedule = Vec::new();
        for queue in &self.queues {
            for _ in 0..queue.weight {
                schedule.push(queue.name.clone());
            }
        }
        schedule
    }

    /// Whether `name` is one of the configured queues.
    pub fn has_queue(&self, name: &str) -> bool {
        self.queues.iter().any(|q| q.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let config = QueueConfig::default();
        assert_eq!(config.queues.len(), 2);
        assert_eq!(config.queues[0].name, "ingest");
        assert_eq!(config.queues[0].weight, 6);
        assert_eq!(config.queues[1].name, "retry");
        assert_eq!(config.queues[1].weight, 3);
        assert_eq!(config.dedup_ttl_secs, 86_400);
    }

    #[test]
    fn test_lease_schedule_expansion() {
        let config = QueueConfig::default();
        let schedule = config.lease_schedule();
        assert_eq!(schedule.len(), 9);
        assert_eq!(schedule.iter().filter(|q| *q == "ingest").count(), 6);
        assert_eq!(schedule.iter().filter(|q| *q == "retry").count(), 3);
    }

    #[test]
    fn test_deserialize_custom_queues() {
        let toml = r#"
ingest_queue = "photos"
retry_queue = "replay"

[[queues]]
name = "photos"
weight = 4

[[queues]]
name = "replay"
weight = 1
"#;
        let config: QueueConfig = toml::from_str(toml).unwrap();
        assert!(config.has_queue("photos"));
        assert!(!config.has_queue("ingest"));
        assert_eq!(config.lease_schedule().len(), 5);
    }
}

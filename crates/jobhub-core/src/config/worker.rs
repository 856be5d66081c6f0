//! Worker runtime configuration.

use serde::{Deserialize, Serialize};

/// Worker polling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker identity, used for capability topics and logs.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    /// Task types this worker claims.
    #[serde(default = "default_task_types")]
    pub task_types: Vec<String>,
    /// Delay between empty polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Number of jobs processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How long shutdown waits for in-flight jobs, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            task_types: default_task_types(),
            poll_interval_ms: default_poll_interval(),
            concurrency: default_concurrency(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_worker_id() -> String {
    "worker-default".to_string()
}

fn default_task_types() -> Vec<String> {
    vec!["image_resize".to_string(), "image_conversion".to_string()]
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    1
}

fn default_shutdown_grace() -> u64 {
    30
}

//! Worker capability advertisement payload.

use serde::{Deserialize, Serialize};

use super::job::now_ms;

/// Retained message a worker publishes so observers can see which task
/// types it handles and how many slots are free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapability {
    /// Worker identity.
    pub worker_id: String,
    /// Task types the worker claims.
    pub capabilities: Vec<String>,
    /// Free execution slots at the time of publishing.
    pub idle_count: usize,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl WorkerCapability {
    /// Build an advertisement stamped with the current time.
    pub fn new(worker_id: impl Into<String>, capabilities: Vec<String>, idle_count: usize) -> Self {
        Self {
            worker_id: worker_id.into(),
            capabilities,
            idle_count,
            timestamp: now_ms(),
        }
    }

    /// Topic the advertisement is retained on.
    pub fn topic(prefix: &str, worker_id: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), worker_id)
    }
}

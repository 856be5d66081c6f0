//! Retained capability advertisement for a worker.
//!
//! The advertisement lives on `{capability_prefix}/{worker_id}`. The Last
//! Will on the same topic is an empty retained payload, so the broker
//! clears the advertisement if the worker dies without withdrawing it.

use tracing::{debug, warn};

use jobhub_core::traits::EventBroadcaster;
use jobhub_core::types::WorkerCapability;
use jobhub_realtime::Broadcaster;

/// Publishes and withdraws one worker's capability advertisement.
#[derive(Debug, Clone)]
pub struct CapabilityAdvertiser {
    broadcaster: Broadcaster,
    worker_id: String,
    task_types: Vec<String>,
    topic: String,
}

impl CapabilityAdvertiser {
    /// Create an advertiser for `worker_id`.
    pub fn new(broadcaster: Broadcaster, worker_id: impl Into<String>, task_types: Vec<String>) -> Self {
        let worker_id = worker_id.into();
        let topic = broadcaster.capability_topic(&worker_id);
        Self {
            broadcaster,
            worker_id,
            task_types,
            topic,
        }
    }

    /// Retained topic of this worker.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Register the Last Will, then connect the broadcaster.
    pub async fn connect_with_will(&self) -> bool {
        if !self.broadcaster.set_will(&self.topic, b"").await {
            debug!(topic = %self.topic, "Transport has no last will");
        }
        self.broadcaster.connect().await
    }

    /// Publish the current advertisement.
    pub async fn advertise(&self, idle_count: usize) -> bool {
        let capability =
            WorkerCapability::new(&self.worker_id, self.task_types.clone(), idle_count);
        match serde_json::to_vec(&capability) {
            Ok(payload) => self.broadcaster.publish_retained(&self.topic, &payload).await,
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "Failed to serialize capability");
                false
            }
        }
    }

    /// Clear the advertisement.
    pub async fn withdraw(&self) -> bool {
        self.broadcaster.clear_retained(&self.topic).await
    }
}

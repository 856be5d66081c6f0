//! Shared, reconfigurable broadcaster handle.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use jobhub_core::config::{BroadcastConfig, BroadcastTransport};
use jobhub_core::traits::EventBroadcaster;
use jobhub_core::types::{JobEvent, JobEventKind};

use crate::memory_pubsub::MemoryBroadcaster;
use crate::mqtt::MqttBroadcaster;
use crate::noop::NoopBroadcaster;
use crate::redis_pubsub::RedisBroadcaster;

/// Buffer of the in-memory transport's fan-out channel.
const MEMORY_BUFFER: usize = 1024;

struct Active {
    config: BroadcastConfig,
    backend: Arc<dyn EventBroadcaster>,
}

/// Cheap-to-clone handle to the process's event broadcaster.
///
/// Built once at startup and injected wherever events are emitted. The
/// backend can be swapped at runtime with [`Broadcaster::reconfigure`].
#[derive(Clone)]
pub struct Broadcaster {
    active: Arc<RwLock<Active>>,
    reconfigure_lock: Arc<Mutex<()>>,
    /// Last Will carried over to replacement backends.
    will: Arc<RwLock<Option<(String, Vec<u8>)>>>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (config, _) = self.snapshot();
        f.debug_struct("Broadcaster")
            .field("transport", &config.transport)
            .field("host", &config.host)
            .field("port", &config.port)
            .finish()
    }
}

impl Broadcaster {
    /// Build a handle for `config` without connecting.
    pub fn new(config: BroadcastConfig) -> Self {
        let backend = build_backend(&config);
        Self::with_backend(config, backend)
    }

    /// Build a handle and connect it. A failed connection is logged and
    /// leaves the handle usable but disconnected.
    pub async fn connect(config: BroadcastConfig) -> Self {
        let handle = Self::new(config);
        handle.backend().connect().await;
        handle
    }

    /// Wrap an existing backend.
    pub fn with_backend(config: BroadcastConfig, backend: Arc<dyn EventBroadcaster>) -> Self {
        Self {
            active: Arc::new(RwLock::new(Active { config, backend })),
            reconfigure_lock: Arc::new(Mutex::new(())),
            will: Arc::new(RwLock::new(None)),
        }
    }

    /// A handle whose every operation succeeds and does nothing.
    pub fn disabled() -> Self {
        Self::with_backend(BroadcastConfig::disabled(), Arc::new(NoopBroadcaster))
    }

    /// The current backend.
    pub fn backend(&self) -> Arc<dyn EventBroadcaster> {
        self.snapshot().1
    }

    /// The configuration the current backend was built from.
    pub fn config(&self) -> BroadcastConfig {
        self.snapshot().0
    }

    /// Retained topic for a worker's capability advertisement.
    pub fn capability_topic(&self, worker_id: &str) -> String {
        jobhub_core::types::WorkerCapability::topic(&self.config().capability_prefix, worker_id)
    }

    /// Apply a new configuration.
    ///
    /// When transport, host and port are unchanged the live backend is
    /// kept. Otherwise the old backend is disconnected and a new one is
    /// built and connected. Returns `true` when the backend was replaced.
    pub async fn reconfigure(&self, config: BroadcastConfig) -> bool {
        let _guard = self.reconfigure_lock.lock().await;

        let (current, old) = self.snapshot();
        if current.identity() == config.identity() {
            debug!(transport = %config.transport, "Broadcast identity unchanged, keeping backend");
            if !old.is_connected() {
                old.connect().await;
            }
            return false;
        }

        info!(
            from = %current.transport,
            to = %config.transport,
            host = %config.host,
            port = config.port,
            "Reconfiguring broadcaster"
        );
        old.disconnect().await;

        let backend = build_backend(&config);
        let will = self.will.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some((topic, payload)) = will {
            backend.set_will(&topic, &payload).await;
        }
        backend.connect().await;
        {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            *active = Active { config, backend };
        }
        true
    }

    /// Build and publish a lifecycle event.
    pub async fn emit(&self, kind: JobEventKind, job_id: &str, data: Value) -> bool {
        self.publish_event(&JobEvent::new(kind, job_id, data)).await
    }

    fn snapshot(&self) -> (BroadcastConfig, Arc<dyn EventBroadcaster>) {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        (active.config.clone(), active.backend.clone())
    }
}

/// Construct the backend for a transport.
fn build_backend(config: &BroadcastConfig) -> Arc<dyn EventBroadcaster> {
    match config.transport {
        BroadcastTransport::Mqtt => Arc::new(MqttBroadcaster::new(config.clone())),
        BroadcastTransport::Redis => Arc::new(RedisBroadcaster::new(config.clone())),
        BroadcastTransport::Memory => {
            Arc::new(MemoryBroadcaster::new(config.topic.clone(), MEMORY_BUFFER))
        }
        BroadcastTransport::None => Arc::new(NoopBroadcaster),
    }
}

#[async_trait]
impl EventBroadcaster for Broadcaster {
    fn transport(&self) -> BroadcastTransport {
        self.backend().transport()
    }

    async fn connect(&self) -> bool {
        self.backend().connect().await
    }

    async fn disconnect(&self) {
        self.backend().disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.backend().is_connected()
    }

    async fn publish_event(&self, event: &JobEvent) -> bool {
        let delivered = self.backend().publish_event(event).await;
        debug!(
            job_id = %event.job_id,
            event_type = %event.event_type,
            delivered,
            "Broadcast event"
        );
        delivered
    }

    async fn publish_retained(&self, topic: &str, payload: &[u8]) -> bool {
        self.backend().publish_retained(topic, payload).await
    }

    async fn clear_retained(&self, topic: &str) -> bool {
        self.backend().clear_retained(topic).await
    }

    async fn set_will(&self, topic: &str, payload: &[u8]) -> bool {
        *self.will.write().unwrap_or_else(|e| e.into_inner()) =
            Some((topic.to_string(), payload.to_vec()));
        self.backend().set_will(topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_handle_always_succeeds() {
        let handle = Broadcaster::disabled();
        assert!(handle.is_connected());
        assert!(handle.emit(JobEventKind::Queued, "j1", Value::Null).await);
        assert!(handle.publish_retained("t", b"x").await);
        assert!(handle.set_will("t", b"").await);
        assert_eq!(handle.transport(), BroadcastTransport::None);
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_backend_for_same_identity() {
        let handle = Broadcaster::connect(BroadcastConfig::memory()).await;
        let before = handle.backend();

        let same = BroadcastConfig {
            topic: "other/events".to_string(),
            ..BroadcastConfig::memory()
        };
        assert!(!handle.reconfigure(same).await);
        assert!(Arc::ptr_eq(&before, &handle.backend()));
    }

    #[tokio::test]
    async fn test_reconfigure_swaps_backend_on_identity_change() {
        let handle = Broadcaster::connect(BroadcastConfig::memory()).await;
        let before = handle.backend();
        assert!(before.is_connected());

        assert!(handle.reconfigure(BroadcastConfig::disabled()).await);
        assert!(!before.is_connected());
        assert_eq!(handle.transport(), BroadcastTransport::None);
    }

    #[tokio::test]
    async fn test_reconfigure_carries_last_will() {
        let handle = Broadcaster::connect(BroadcastConfig::memory()).await;
        assert!(handle.set_will("inference/workers/w1", b"").await);

        let moved = BroadcastConfig {
            host: "other-node".to_string(),
            ..BroadcastConfig::memory()
        };
        assert!(handle.reconfigure(moved).await);
        assert!(handle.is_connected());

        let will = handle.will.read().unwrap().clone();
        assert_eq!(will, Some(("inference/workers/w1".to_string(), Vec::new())));
    }

    #[tokio::test]
    async fn test_unreachable_mqtt_does_not_gate_callers() {
        let handle = Broadcaster::connect(BroadcastConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 300,
            ..BroadcastConfig::default()
        })
        .await;

        assert!(!handle.is_connected());
        assert!(!handle.emit(JobEventKind::Progress, "j1", Value::Null).await);
    }

    #[test]
    fn test_capability_topic_uses_prefix() {
        let handle = Broadcaster::new(BroadcastConfig::disabled());
        assert_eq!(handle.capability_topic("w1"), "inference/workers/w1");
    }
}

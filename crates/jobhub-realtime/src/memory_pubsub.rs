//! In-process broadcaster for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use jobhub_core::config::BroadcastTransport;
use jobhub_core::traits::EventBroadcaster;
use jobhub_core::types::JobEvent;

/// A message delivered to in-process subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Whether the message was published as retained.
    pub retained: bool,
}

/// In-memory pub/sub with a retained last-value map.
#[derive(Debug)]
pub struct MemoryBroadcaster {
    /// Events topic.
    topic: String,
    /// Fan-out to subscribers.
    tx: broadcast::Sender<MemoryMessage>,
    /// Topic → last retained payload.
    retained: RwLock<HashMap<String, Vec<u8>>>,
    /// Last Will registered for the next connection.
    will: RwLock<Option<(String, Vec<u8>)>>,
    /// Last Will attached to the live connection.
    armed_will: RwLock<Option<(String, Vec<u8>)>>,
    connected: AtomicBool,
}

impl MemoryBroadcaster {
    /// Create a new in-memory broadcaster publishing events on `topic`.
    pub fn new(topic: impl Into<String>, buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self {
            topic: topic.into(),
            tx,
            retained: RwLock::new(HashMap::new()),
            will: RwLock::new(None),
            armed_will: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Subscribe to every message published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MemoryMessage> {
        self.tx.subscribe()
    }

    /// Current retained payload for a topic.
    pub async fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.retained.read().await.get(topic).cloned()
    }

    /// Drop the connection without a clean disconnect, delivering the Last
    /// Will attached at connect time the way a broker would.
    pub async fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let will = self.armed_will.write().await.take();
        if let Some((topic, payload)) = will {
            debug!(topic = %topic, "Delivering last will");
            self.store_retained(&topic, payload.clone()).await;
            let _ = self.tx.send(MemoryMessage {
                topic,
                payload,
                retained: true,
            });
        }
    }

    async fn store_retained(&self, topic: &str, payload: Vec<u8>) {
        let mut retained = self.retained.write().await;
        if payload.is_empty() {
            retained.remove(topic);
        } else {
            retained.insert(topic.to_string(), payload);
        }
    }

    fn send(&self, topic: &str, payload: Vec<u8>, retained: bool) -> bool {
        if !self.is_connected() {
            debug!(topic, "Memory broadcaster not connected, dropping message");
            return false;
        }
        // No subscribers is not a failure
        let _ = self.tx.send(MemoryMessage {
            topic: topic.to_string(),
            payload,
            retained,
        });
        true
    }
}

#[async_trait]
impl EventBroadcaster for MemoryBroadcaster {
    fn transport(&self) -> BroadcastTransport {
        BroadcastTransport::Memory
    }

    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        *self.armed_will.write().await = self.will.read().await.clone();
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.armed_will.write().await = None;
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish_event(&self, event: &JobEvent) -> bool {
        match event.to_payload() {
            Ok(payload) => self.send(&self.topic, payload, false),
            Err(e) => {
                warn!(job_id = %event.job_id, error = %e, "Failed to serialize event");
                false
            }
        }
    }

    async fn publish_retained(&self, topic: &str, payload: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.store_retained(topic, payload.to_vec()).await;
        self.send(topic, payload.to_vec(), true)
    }

    async fn clear_retained(&self, topic: &str) -> bool {
        self.publish_retained(topic, &[]).await
    }

    async fn set_will(&self, topic: &str, payload: &[u8]) -> bool {
        *self.will.write().await = Some((topic.to_string(), payload.to_vec()));
        if self.is_connected() {
            // A will only attaches at connect, so bounce the session
            self.disconnect().await;
            return self.connect().await;
        }
        true
    }
}

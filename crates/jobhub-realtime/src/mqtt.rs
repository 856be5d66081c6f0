//! MQTT broadcaster.
//!
//! Publishes at QoS 1 through `rumqttc`. The event loop runs on its own
//! task; `connect` waits for the broker's CONNACK up to the configured
//! timeout. A Last Will can only be attached when the session is opened,
//! so `set_will` on a live session reconnects it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS,
};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobhub_core::config::{BroadcastConfig, BroadcastTransport};
use jobhub_core::traits::EventBroadcaster;
use jobhub_core::types::JobEvent;

/// Outgoing request buffer between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;
/// Back-off after a connection error once the session was established.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// MQTT implementation of [`EventBroadcaster`].
pub struct MqttBroadcaster {
    config: BroadcastConfig,
    client_id: String,
    session: Mutex<Option<Session>>,
    will: Mutex<Option<LastWill>>,
    connected: Arc<AtomicBool>,
}

impl std::fmt::Debug for MqttBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroadcaster")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MqttBroadcaster {
    /// Create a disconnected broadcaster.
    pub fn new(config: BroadcastConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("jobhub-{}", uuid::Uuid::new_v4().simple()));
        Self {
            config,
            client_id,
            session: Mutex::new(None),
            will: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// MQTT client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_seconds.max(5)));
        if let Some(will) = self.will.lock().await.clone() {
            options.set_last_will(will);
        }
        options
    }

    async fn client(&self) -> Option<AsyncClient> {
        if !self.is_connected() {
            return None;
        }
        self.session.lock().await.as_ref().map(|s| s.client.clone())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> bool {
        let Some(client) = self.client().await else {
            debug!(topic, "MQTT not connected, dropping message");
            return false;
        };

        let timeout = Duration::from_millis(self.config.publish_timeout_ms);
        match tokio::time::timeout(timeout, client.publish(topic, QoS::AtLeastOnce, retain, payload))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(topic, error = %e, "MQTT publish failed");
                false
            }
            Err(_) => {
                warn!(topic, timeout_ms = self.config.publish_timeout_ms, "MQTT publish timed out");
                false
            }
        }
    }
}

/// Drive the event loop until a clean disconnect, reporting the first
/// CONNACK (or the first failure before it) through `ready`.
async fn run_event_loop(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let ok = ack.code == ConnectReturnCode::Success;
                connected.store(ok, Ordering::SeqCst);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(if ok {
                        Ok(())
                    } else {
                        Err(format!("connection refused: {:?}", ack.code))
                    });
                    if !ok {
                        return;
                    }
                } else if ok {
                    info!("MQTT reconnected");
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl EventBroadcaster for MqttBroadcaster {
    fn transport(&self) -> BroadcastTransport {
        BroadcastTransport::Mqtt
    }

    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let options = self.options().await;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run_event_loop(eventloop, self.connected.clone(), ready_tx));

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let outcome = match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("event loop stopped".to_string()),
            Err(_) => Err(format!("no CONNACK within {}ms", self.config.connect_timeout_ms)),
        };

        let mut session = self.session.lock().await;
        if let Some(old) = session.take() {
            old.task.abort();
        }

        match outcome {
            Ok(()) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    client_id = %self.client_id,
                    "Connected to MQTT broker"
                );
                *session = Some(Session { client, task });
                true
            }
            Err(reason) => {
                task.abort();
                self.connected.store(false, Ordering::SeqCst);
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    reason = %reason,
                    "Failed to connect to MQTT broker"
                );
                false
            }
        }
    }

    async fn disconnect(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        let timeout = Duration::from_millis(self.config.publish_timeout_ms);
        if tokio::time::timeout(timeout, session.client.disconnect())
            .await
            .is_ok()
        {
            let mut task = session.task;
            if tokio::time::timeout(timeout, &mut task).await.is_err() {
                task.abort();
            }
        } else {
            session.task.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(host = %self.config.host, "Disconnected from MQTT broker");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish_event(&self, event: &JobEvent) -> bool {
        match event.to_payload() {
            Ok(payload) => self.publish(&self.config.topic, payload, false).await,
            Err(e) => {
                warn!(job_id = %event.job_id, error = %e, "Failed to serialize event");
                false
            }
        }
    }

    async fn publish_retained(&self, topic: &str, payload: &[u8]) -> bool {
        self.publish(topic, payload.to_vec(), true).await
    }

    async fn clear_retained(&self, topic: &str) -> bool {
        self.publish(topic, Vec::new(), true).await
    }

    async fn set_will(&self, topic: &str, payload: &[u8]) -> bool {
        *self.will.lock().await = Some(LastWill::new(
            topic,
            payload.to_vec(),
            QoS::AtLeastOnce,
            true,
        ));
        if !self.is_connected() {
            return true;
        }
        debug!(topic, "Last will changed, reconnecting to attach it");
        self.disconnect().await;
        self.connect().await
    }
}

//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

use jobhub_core::config::{BroadcastConfig, DatabaseConfig};
use jobhub_core::traits::EventBroadcaster;
use jobhub_database::{DatabasePool, JobStore};
use jobhub_realtime::{Broadcaster, MemoryBroadcaster, MemoryMessage};
use jobhub_service::QueueService;
use jobhub_storage::LocalJobStorage;

/// A queue on a file-backed SQLite database plus job storage, both under
/// one scratch directory.
pub struct TestApp {
    /// Queue wired to the in-memory broadcaster.
    pub queue: Arc<QueueService>,
    /// Job storage rooted in the scratch directory.
    pub storage: Arc<LocalJobStorage>,
    /// Broadcaster backend, for subscribing to events.
    pub events: Arc<MemoryBroadcaster>,
    /// Scratch directory; removed on drop.
    pub dir: TempDir,
}

impl TestApp {
    /// Create a fresh application with migrations applied.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create scratch dir");

        let pool = connect(&dir, 8).await;
        jobhub_database::migration::run_migrations(pool.pool())
            .await
            .expect("Failed to run migrations");

        let events = Arc::new(MemoryBroadcaster::new("inference/events", 256));
        events.connect().await;
        let broadcaster = Broadcaster::with_backend(BroadcastConfig::memory(), events.clone());

        let queue = Arc::new(QueueService::new(JobStore::new(pool.into_pool()), broadcaster));
        let storage = Arc::new(
            LocalJobStorage::new(dir.path().join("data"))
                .await
                .expect("Failed to init storage"),
        );

        Self {
            queue,
            storage,
            events,
            dir,
        }
    }

    /// Another queue on the same database file with its own pool, the
    /// way a separate worker process would see it.
    pub async fn other_queue(&self) -> QueueService {
        let pool = connect(&self.dir, 2).await;
        QueueService::new(JobStore::new(pool.into_pool()), Broadcaster::disabled())
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> Receiver<MemoryMessage> {
        self.events.subscribe()
    }
}

/// Drain every event currently buffered as `(event_type, payload)`.
pub fn drain_events(rx: &mut Receiver<MemoryMessage>) -> Vec<(String, serde_json::Value)> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        let payload: serde_json::Value =
            serde_json::from_slice(&msg.payload).expect("Event payload is JSON");
        let kind = payload["event_type"].as_str().unwrap_or_default().to_string();
        events.push((kind, payload));
    }
    events
}

async fn connect(dir: &TempDir, max_connections: u32) -> DatabasePool {
    let url = format!("sqlite://{}", dir.path().join("media_store.db").display());
    let config = DatabaseConfig {
        max_connections,
        ..DatabaseConfig::new(url)
    };
    DatabasePool::connect(&config)
        .await
        .expect("Failed to connect to test database")
}

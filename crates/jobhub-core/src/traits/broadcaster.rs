//! Lifecycle event fan-out interface.

use async_trait::async_trait;

use crate::config::BroadcastTransport;
use crate::types::JobEvent;

/// Best-effort pub/sub publisher.
///
/// No method returns an error: transport failures are logged by the
/// implementation and surface as `false`.
#[async_trait]
pub trait EventBroadcaster: Send + Sync + 'static {
    /// Which transport this is.
    fn transport(&self) -> BroadcastTransport;

    /// Establish the connection. Leaves the broadcaster disconnected on
    /// failure.
    async fn connect(&self) -> bool;

    /// Close the connection.
    async fn disconnect(&self);

    /// Whether the transport is currently usable.
    fn is_connected(&self) -> bool;

    /// Publish a lifecycle event on the events topic.
    async fn publish_event(&self, event: &JobEvent) -> bool;

    /// Publish a retained last-value message.
    async fn publish_retained(&self, topic: &str, payload: &[u8]) -> bool;

    /// Clear a retained message.
    async fn clear_retained(&self, topic: &str) -> bool;

    /// Register a message the transport delivers on unclean disconnect.
    /// A live session is re-established so the will is attached.
    async fn set_will(&self, topic: &str, payload: &[u8]) -> bool;
}

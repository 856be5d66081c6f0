//! Broadcaster used when broadcasting is disabled.

use async_trait::async_trait;

use jobhub_core::config::BroadcastTransport;
use jobhub_core::traits::EventBroadcaster;
use jobhub_core::types::JobEvent;

/// Accepts everything and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcaster;

#[async_trait]
impl EventBroadcaster for NoopBroadcaster {
    fn transport(&self) -> BroadcastTransport {
        BroadcastTransport::None
    }

    async fn connect(&self) -> bool {
        true
    }

    async fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        true
    }

    async fn publish_event(&self, _event: &JobEvent) -> bool {
        true
    }

    async fn publish_retained(&self, _topic: &str, _payload: &[u8]) -> bool {
        true
    }

    async fn clear_retained(&self, _topic: &str) -> bool {
        true
    }

    async fn set_will(&self, _topic: &str, _payload: &[u8]) -> bool {
        true
    }
}

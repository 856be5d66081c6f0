//! # jobhub-realtime
//!
//! Best-effort fan-out of job lifecycle events. Every transport satisfies
//! [`EventBroadcaster`](jobhub_core::traits::EventBroadcaster) and never
//! returns an error: failures are logged and reported as `false`.
//!
//! The [`Broadcaster`] handle is built once at startup and injected into
//! the queue and the worker runtime.

pub mod broadcaster;
pub mod memory_pubsub;
pub mod mqtt;
pub mod noop;
pub mod redis_pubsub;

pub use broadcaster::Broadcaster;
pub use memory_pubsub::{MemoryBroadcaster, MemoryMessage};
pub use mqtt::MqttBroadcaster;
pub use noop::NoopBroadcaster;
pub use redis_pubsub::RedisBroadcaster;

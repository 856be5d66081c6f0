//! # jobhub-service
//!
//! The job claim queue. [`QueueService`] pairs every persisted state
//! change with a best-effort broadcast; broadcast failures never fail or
//! roll back the write.
//!
//! Dependencies are injected at construction time.

pub mod queue;

pub use queue::QueueService;

//! Job queue service and operator maintenance.

pub mod reaper;
pub mod service;

pub use service::QueueService;

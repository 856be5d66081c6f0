//! # jobhub-worker
//!
//! Worker runtime: polls the queue for the task types it has handlers
//! for, runs each claimed job through its [`TaskHandler`], records the
//! terminal status, and advertises its capabilities as a retained message
//! guarded by a Last Will.
//!
//! Task-specific compute logic lives in the embedding executable.

pub mod capability;
pub mod executor;
pub mod runner;

pub use capability::CapabilityAdvertiser;
pub use executor::{ProgressReporter, TaskContext, TaskExecutionError, TaskExecutor, TaskHandler};
pub use runner::WorkerRunner;

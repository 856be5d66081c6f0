//! Shared domain types used across crates.

pub mod capability;
pub mod event;
pub mod file;
pub mod job;

pub use capability::WorkerCapability;
pub use event::{JobEvent, JobEventKind};
pub use file::{FileReader, FileSource, SavedFile, StorageUsage, SweepReport};
pub use job::{Job, JobStatus, JobUpdate, NewJob, ReapReport, now_ms};

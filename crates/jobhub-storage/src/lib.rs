//! # jobhub-storage
//!
//! Job-scoped file storage on the local filesystem: one directory per job
//! with `input/` and `output/` subtrees, SHA-256 hashing over the bytes as
//! they are written, a retention sweep, and a date-partitioned
//! content-addressed store for artifacts that outlive a job.

pub mod content;
pub mod hashing;
pub mod local;
pub mod paths;
pub mod retention;

pub use content::ContentStore;
pub use local::LocalJobStorage;

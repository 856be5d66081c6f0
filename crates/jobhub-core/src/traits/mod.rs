//! Interfaces defined in `jobhub-core` and implemented by other crates.

pub mod broadcaster;
pub mod repository;
pub mod storage;

pub use broadcaster::EventBroadcaster;
pub use repository::JobRepository;
pub use storage::JobStorage;

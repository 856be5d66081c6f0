//! # jobhub-database
//!
//! SQLite connection management, embedded migrations and the raw SQL for
//! the jobs table.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::job::JobStore;

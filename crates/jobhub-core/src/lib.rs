//! # jobhub-core
//!
//! Core crate for JobHub. Contains the job domain types, the interfaces
//! implemented by the storage, persistence and broadcast crates,
//! configuration schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other JobHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

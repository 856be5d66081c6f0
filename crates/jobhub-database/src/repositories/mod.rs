//! Concrete SQL stores.

pub mod job;

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! take the executor (pool or connection) as the first argument, so a
//! worker can run every statement on the connection it owns.

pub mod job_repo;

pub use job_repo::JobRepo;

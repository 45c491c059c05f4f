//! Vigil domain types shared by every crate in the workspace.
//!
//! Contains no I/O: job status state machine, persisted error codes,
//! the claimed-job snapshot and the outbound webhook envelope.

pub mod error;
pub mod job;
pub mod types;

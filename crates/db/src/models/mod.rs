//! Row structs and DTOs.

pub mod job;

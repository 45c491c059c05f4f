//! Request handlers. Each submodule delegates to a repository in
//! `vigil_db` and maps errors via [`AppError`](crate::error::AppError).

pub mod job;

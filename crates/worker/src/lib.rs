//! Job dispatcher: claims pending jobs from the store, runs inference on
//! them, and reports outcomes through webhooks.

pub mod claim;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod health;
pub mod store;

pub use dispatcher::{DispatchError, DispatchMode, Dispatcher};
pub use executor::{ExecutorError, JobExecutor, JobOutcome};

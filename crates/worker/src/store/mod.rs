//! Store capability handed to the dispatcher.
//!
//! A [`StoreConnector`] opens [`JobStore`] handles; each handle owns one
//! connection and is used by exactly one task at a time. The claim is the
//! only operation that coordinates with other handles, through the
//! store's row locking.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use vigil_core::job::{ClaimedJob, JobError};
use vigil_core::types::JobId;

pub use memory::{MemoryBackend, MemoryStore};
pub use postgres::{PgConnector, PgJobStore};

/// Store connectivity or query failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The four lifecycle transitions plus the claim, on one connection.
///
/// Transitions return `Ok(false)` when their status guard matched no row
/// (the job was changed out of band); store failures are `Err`.
#[async_trait]
pub trait JobStore: Send {
    /// Claim the oldest pending job, or `None` when nothing is eligible.
    async fn claim_next(&mut self) -> Result<Option<ClaimedJob>, StoreError>;

    /// `running -> completing`, persisting `output`.
    async fn mark_completing(
        &mut self,
        id: JobId,
        output: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Any non-terminal status `-> failed`, persisting `error`.
    async fn mark_failed(&mut self, id: JobId, error: &JobError) -> Result<bool, StoreError>;

    /// `completing -> completed`.
    async fn mark_completed(&mut self, id: JobId) -> Result<bool, StoreError>;

    /// Any non-terminal status `-> cancelled`.
    async fn mark_cancelled(&mut self, id: JobId) -> Result<bool, StoreError>;

    /// Release the underlying connection.
    async fn close(self) -> Result<(), StoreError>;
}

/// Opens store handles; one handle per connection.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    type Store: JobStore + 'static;

    async fn connect(&self) -> Result<Self::Store, StoreError>;
}

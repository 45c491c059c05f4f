//! PostgreSQL-backed [`JobStore`]: one dedicated `PgConnection` per handle.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use vigil_core::job::{ClaimedJob, JobError};
use vigil_core::types::JobId;
use vigil_db::repositories::JobRepo;

use super::{JobStore, StoreConnector, StoreError};

/// Opens a fresh connection per [`PgJobStore`].
#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgJobStore;

    async fn connect(&self) -> Result<PgJobStore, StoreError> {
        let conn = PgConnection::connect(&self.database_url).await?;
        Ok(PgJobStore::from_connection(conn))
    }
}

/// A store handle owning a single connection.
pub struct PgJobStore {
    conn: PgConnection,
}

impl PgJobStore {
    /// Wrap an already open connection, e.g. one detached from a pool.
    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next(&mut self) -> Result<Option<ClaimedJob>, StoreError> {
        Ok(JobRepo::claim_next(&mut self.conn).await?)
    }

    async fn mark_completing(
        &mut self,
        id: JobId,
        output: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::mark_completing(&mut self.conn, id, output).await?)
    }

    async fn mark_failed(&mut self, id: JobId, error: &JobError) -> Result<bool, StoreError> {
        Ok(JobRepo::mark_failed(&mut self.conn, id, error).await?)
    }

    async fn mark_completed(&mut self, id: JobId) -> Result<bool, StoreError> {
        Ok(JobRepo::mark_completed(&mut self.conn, id).await?)
    }

    async fn mark_cancelled(&mut self, id: JobId) -> Result<bool, StoreError> {
        Ok(JobRepo::mark_cancelled(&mut self.conn, id).await?)
    }

    async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

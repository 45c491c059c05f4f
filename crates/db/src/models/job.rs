//! Job entity model for the work queue.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use vigil_core::error::CoreError;
use vigil_core::job::{ClaimedJob, JobError, JobStatus};
use vigil_core::types::{JobId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub input: serde_json::Value,
    pub status: String,
    pub output: Option<serde_json::Value>,
    pub error: Option<Json<JobError>>,
    pub resubmitted_from: Option<JobId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Parse the text status column.
    pub fn job_status(&self) -> Result<JobStatus, CoreError> {
        self.status.parse()
    }

    /// The persisted `{code, message}` error, if any.
    pub fn job_error(&self) -> Option<&JobError> {
        self.error.as_ref().map(|e| &e.0)
    }
}

/// The `(id, input)` snapshot returned by a claim.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedRow {
    pub id: JobId,
    pub input: serde_json::Value,
}

impl From<ClaimedRow> for ClaimedJob {
    fn from(row: ClaimedRow) -> Self {
        Self {
            id: row.id,
            input: row.input,
        }
    }
}

/// DTO for inserting a new pending job.
#[derive(Debug, Deserialize)]
pub struct SubmitJob {
    pub input: serde_json::Value,
}

//! Repository for the `jobs` table.
//!
//! Every state transition is a single guarded `UPDATE`, so it commits as
//! one transaction and never rewrites a row that already reached a
//! terminal status. Transitions return `true` when a row was changed.

use sqlx::types::Json;
use sqlx::PgExecutor;
use vigil_core::job::{ClaimedJob, JobError, JobStatus};
use vigil_core::types::JobId;

use crate::models::job::{ClaimedRow, Job, SubmitJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, input, status, output, error, resubmitted_from, created_at, updated_at";

/// SQL list of terminal statuses for `NOT IN` guards.
const TERMINAL_SQL: &str = "('completed', 'failed', 'cancelled')";

/// Provides queue operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job.
    pub async fn submit<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &SubmitJob,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (input, status) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.input)
            .bind(JobStatus::Pending.as_str())
            .fetch_one(executor)
            .await
    }

    /// Atomically claim the oldest pending job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent dispatchers
    /// never claim the same row: a row locked by another in-flight claim
    /// is skipped rather than waited on. Returns `None` when nothing is
    /// eligible.
    pub async fn claim_next<'e, E: PgExecutor<'e>>(
        executor: E,
    ) -> Result<Option<ClaimedJob>, sqlx::Error> {
        let row = sqlx::query_as::<_, ClaimedRow>(
            "UPDATE jobs \
             SET status = $1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $2 \
                 ORDER BY created_at ASC, seq ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             AND status = $2 \
             RETURNING id, input",
        )
        .bind(JobStatus::Running.as_str())
        .bind(JobStatus::Pending.as_str())
        .fetch_optional(executor)
        .await?;
        Ok(row.map(ClaimedJob::from))
    }

    /// Persist the inference output and move `running -> completing`.
    pub async fn mark_completing<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: JobId,
        output: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = $2, output = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(job_id)
        .bind(JobStatus::Completing.as_str())
        .bind(output)
        .bind(JobStatus::Running.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a non-terminal job as failed.
    ///
    /// `output` is left untouched, so a job that fails during delivery
    /// keeps its computed result. No automatic retry is performed; see
    /// [`JobRepo::resubmit`].
    pub async fn mark_failed<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: JobId,
        error: &JobError,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, error = $3, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN {TERMINAL_SQL}"
        );
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(JobStatus::Failed.as_str())
            .bind(Json(error))
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move `completing -> completed` once delivery is settled.
    pub async fn mark_completed<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: JobId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Completing.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns `true` if the job was cancelled, `false` if it was already
    /// completed, failed, or cancelled.
    pub async fn mark_cancelled<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: JobId,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN {TERMINAL_SQL}"
        );
        let result = sqlx::query(&query)
            .bind(job_id)
            .bind(JobStatus::Cancelled.as_str())
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a new pending job from a failed or cancelled job's input.
    ///
    /// The new job has `resubmitted_from` pointing to the original, which
    /// stays untouched. This is the only way such a job runs again. Returns
    /// `None` when `job_id` does not exist or is in any other status.
    pub async fn resubmit<'e, E: PgExecutor<'e>>(
        executor: E,
        job_id: JobId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (input, status, resubmitted_from) \
             SELECT input, $2, id FROM jobs WHERE id = $1 AND status IN ($3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Failed.as_str())
            .bind(JobStatus::Cancelled.as_str())
            .fetch_optional(executor)
            .await
    }

    /// List jobs, newest first.
    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             ORDER BY created_at DESC, seq DESC \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: JobId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}

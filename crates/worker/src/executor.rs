//! Job executor: drives one claimed job from `running` to a terminal
//! status.
//!
//! ```text
//! running --(infer ok)------> completing --(notify ok / no webhook)--> completed
//! running --(no input)------> failed (NO_INPUT)
//! running --(infer error)---> failed (INFERENCE_ERROR)
//! running --(cancelled)-----> cancelled
//! completing --(notify err)-> failed (DELIVERY_ERROR), output kept
//! ```
//!
//! Inference and webhook failures never escape: they become store state.
//! Only store errors are returned to the dispatch loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use vigil_core::job::{ClaimedJob, ErrorCode, JobError};
use vigil_core::types::JobId;
use vigil_events::Notifier;
use vigil_inference::Inference;

use crate::store::{JobStore, StoreError};

/// Delay before the single retry of a failed `mark_failed`.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Terminal result of executing one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(ErrorCode),
    Cancelled,
    /// A guarded transition matched no row: the job was changed out of
    /// band and this executor no longer owns it.
    Superseded,
}

/// Store failures while driving a job.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Store error on job {job_id}: {source}")]
    Store {
        job_id: JobId,
        #[source]
        source: StoreError,
    },

    #[error("Could not open a store connection for job {job_id}: {source}")]
    Connect {
        job_id: JobId,
        #[source]
        source: StoreError,
    },

    /// Recording the failure failed twice; the job is stuck in a
    /// non-terminal status.
    #[error("Job {job_id} could not be marked failed: {source}")]
    StuckRunning {
        job_id: JobId,
        #[source]
        source: StoreError,
    },
}

impl ExecutorError {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Store { job_id, .. }
            | Self::Connect { job_id, .. }
            | Self::StuckRunning { job_id, .. } => *job_id,
        }
    }

    /// Whether the worker that hit this error must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StuckRunning { .. })
    }
}

/// Runs inference for claimed jobs and records the outcome.
pub struct JobExecutor {
    inference: Arc<dyn Inference>,
    notifier: Arc<dyn Notifier>,
    retry_delay: Duration,
}

impl JobExecutor {
    pub fn new(inference: Arc<dyn Inference>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inference,
            notifier,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Drive `job`, already `running`, to a terminal status using `store`.
    ///
    /// `cancel` is honoured until the output is persisted; once the job is
    /// `completing` it is always driven to `completed` or `failed`. After a
    /// cancellation the only store write is `mark_cancelled`.
    pub async fn execute<S: JobStore>(
        &self,
        store: &mut S,
        job: ClaimedJob,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ExecutorError> {
        let job_id = job.id;
        tracing::info!(%job_id, "Processing job");

        if cancel.is_cancelled() {
            return self.cancel(store, job_id).await;
        }

        let request = match self.inference.prepare(&job).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Inference preconditions not met");
                let error = JobError::new(ErrorCode::NoInput, e.to_string());
                return self.fail(store, job_id, ErrorCode::NoInput, &error).await;
            }
        };

        let inference = AssertUnwindSafe(self.inference.infer(&request)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(%job_id, "Shutdown requested during inference");
                return self.cancel(store, job_id).await;
            }
            result = inference => result,
        };

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return self.fail_inference(store, &job, e.to_string()).await,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(%job_id, panic = %message, "Inference panicked");
                return self.fail_inference(store, &job, message).await;
            }
        };

        let persisted = store
            .mark_completing(job_id, &output)
            .await
            .map_err(|source| ExecutorError::Store { job_id, source })?;
        if !persisted {
            tracing::warn!(%job_id, "Job changed while running, dropping output");
            return Ok(JobOutcome::Superseded);
        }

        if let Err(e) = self
            .notifier
            .notify(job.webhook_url(), job_id, Some(&output), None)
            .await
        {
            let error = JobError::new(ErrorCode::DeliveryError, e.to_string());
            return self.fail(store, job_id, ErrorCode::DeliveryError, &error).await;
        }

        let completed = store
            .mark_completed(job_id)
            .await
            .map_err(|source| ExecutorError::Store { job_id, source })?;
        if !completed {
            tracing::warn!(%job_id, "Job changed before completion");
            return Ok(JobOutcome::Superseded);
        }

        tracing::info!(%job_id, "Job completed");
        Ok(JobOutcome::Completed)
    }

    /// Record an inference failure, then tell the caller on a best-effort
    /// basis.
    async fn fail_inference<S: JobStore>(
        &self,
        store: &mut S,
        job: &ClaimedJob,
        message: String,
    ) -> Result<JobOutcome, ExecutorError> {
        tracing::error!(job_id = %job.id, error = %message, "Inference failed");
        let error = JobError::new(ErrorCode::InferenceError, message);
        let outcome = self
            .fail(store, job.id, ErrorCode::InferenceError, &error)
            .await?;

        if outcome != JobOutcome::Superseded {
            if let Err(e) = self
                .notifier
                .notify(job.webhook_url(), job.id, None, Some(&error))
                .await
            {
                tracing::warn!(job_id = %job.id, error = %e, "Failure webhook not delivered");
            }
        }
        Ok(outcome)
    }

    /// `mark_failed`, retried once after `retry_delay`. A second store
    /// failure is fatal for the worker.
    async fn fail<S: JobStore>(
        &self,
        store: &mut S,
        job_id: JobId,
        code: ErrorCode,
        error: &JobError,
    ) -> Result<JobOutcome, ExecutorError> {
        let applied = match store.mark_failed(job_id, error).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Failed to mark job failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                store.mark_failed(job_id, error).await.map_err(|source| {
                    tracing::error!(%job_id, error = %source, "Failed to mark job failed twice");
                    ExecutorError::StuckRunning { job_id, source }
                })?
            }
        };

        if applied {
            tracing::info!(%job_id, code = error.code, message = %error.message, "Job failed");
            Ok(JobOutcome::Failed(code))
        } else {
            tracing::warn!(%job_id, "Job already terminal, failure not recorded");
            Ok(JobOutcome::Superseded)
        }
    }

    async fn cancel<S: JobStore>(
        &self,
        store: &mut S,
        job_id: JobId,
    ) -> Result<JobOutcome, ExecutorError> {
        let applied = store
            .mark_cancelled(job_id)
            .await
            .map_err(|source| ExecutorError::Store { job_id, source })?;
        if applied {
            tracing::info!(%job_id, "Job cancelled");
            Ok(JobOutcome::Cancelled)
        } else {
            tracing::warn!(%job_id, "Job already terminal, not cancelled");
            Ok(JobOutcome::Superseded)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "inference panicked".to_string()
    }
}

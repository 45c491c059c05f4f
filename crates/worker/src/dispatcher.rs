//! Dispatch loop: claims jobs and hands them to the executor.
//!
//! Sequential mode runs claim and execution on one task and one
//! connection. Pooled mode keeps a single claiming task that acquires a
//! permit before every claim, so a claimed job is always started at once;
//! each spawned worker opens its own store connection for its job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use vigil_core::job::ClaimedJob;
use vigil_core::types::JobId;

use crate::claim::{ClaimLoop, DEFAULT_POLL_INTERVAL};
use crate::executor::{ExecutorError, JobExecutor, JobOutcome};
use crate::store::{JobStore, StoreConnector};

/// Delay before a worker's second connection attempt.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Sequential,
    Pooled { max_workers: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Pooled dispatch needs at least one worker")]
    NoWorkers,
}

type WorkerResult = (JobId, Result<JobOutcome, ExecutorError>);

/// Claims jobs from stores opened by `C` and executes them.
pub struct Dispatcher<C: StoreConnector> {
    connector: Arc<C>,
    executor: Arc<JobExecutor>,
    mode: DispatchMode,
    poll_interval: Duration,
}

impl<C: StoreConnector> Dispatcher<C> {
    pub fn new(connector: Arc<C>, executor: Arc<JobExecutor>, mode: DispatchMode) -> Self {
        Self {
            connector,
            executor,
            mode,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until `cancel` fires and every in-flight job has finished.
    ///
    /// Returns an error only for conditions that must stop the process: an
    /// invalid pool size, or in sequential mode a job left stuck in a
    /// non-terminal status.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), DispatchError> {
        match self.mode {
            DispatchMode::Sequential => self.run_sequential(&cancel).await,
            DispatchMode::Pooled { max_workers } => self.run_pooled(max_workers, &cancel).await,
        }
    }

    async fn run_sequential(&self, cancel: &CancellationToken) -> Result<(), DispatchError> {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Dispatcher started (sequential)"
        );
        let mut claims = ClaimLoop::new(Arc::clone(&self.connector), self.poll_interval);

        while let Some(job) = claims.next_job(cancel).await {
            let job_id = job.id;
            let result = match claims.store().await {
                Ok(store) => self.executor.execute(store, job, cancel).await,
                Err(source) => Err(ExecutorError::Connect { job_id, source }),
            };

            match result {
                Ok(outcome) => log_outcome(job_id, outcome),
                Err(e) if e.is_fatal() => {
                    tracing::error!(%job_id, error = %e, "Fatal store failure, stopping dispatcher");
                    claims.close().await;
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::error!(%job_id, error = %e, "Job execution interrupted by store error");
                    claims.reset();
                }
            }
        }

        claims.close().await;
        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    async fn run_pooled(
        &self,
        max_workers: usize,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        if max_workers == 0 {
            return Err(DispatchError::NoWorkers);
        }
        tracing::info!(
            max_workers,
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Dispatcher started (pooled)"
        );

        let permits = Arc::new(Semaphore::new(max_workers));
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let mut claims = ClaimLoop::new(Arc::clone(&self.connector), self.poll_interval);

        loop {
            while let Some(result) = workers.try_join_next() {
                log_worker_exit(result);
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(job) = claims.next_job(cancel).await else {
                break;
            };

            let connector = Arc::clone(&self.connector);
            let executor = Arc::clone(&self.executor);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                let job_id = job.id;
                (job_id, run_worker(&*connector, &executor, job, &cancel).await)
            });
        }

        claims.close().await;
        if !workers.is_empty() {
            tracing::info!(in_flight = workers.len(), "Waiting for workers to finish");
        }
        while let Some(result) = workers.join_next().await {
            log_worker_exit(result);
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }
}

/// Execute one job on a dedicated connection, closed afterwards.
async fn run_worker<C: StoreConnector>(
    connector: &C,
    executor: &JobExecutor,
    job: ClaimedJob,
    cancel: &CancellationToken,
) -> Result<JobOutcome, ExecutorError> {
    let job_id = job.id;
    let mut store = match connector.connect().await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(%job_id, error = %e, "Worker connection failed, retrying once");
            tokio::time::sleep(RECONNECT_DELAY).await;
            connector
                .connect()
                .await
                .map_err(|source| ExecutorError::Connect { job_id, source })?
        }
    };

    let result = executor.execute(&mut store, job, cancel).await;
    if let Err(e) = store.close().await {
        tracing::warn!(%job_id, error = %e, "Failed to close worker connection");
    }
    result
}

fn log_outcome(job_id: JobId, outcome: JobOutcome) {
    tracing::debug!(%job_id, ?outcome, "Job finished");
}

fn log_worker_exit(result: Result<WorkerResult, JoinError>) {
    match result {
        Ok((job_id, Ok(outcome))) => log_outcome(job_id, outcome),
        Ok((job_id, Err(e))) if e.is_fatal() => {
            tracing::error!(%job_id, error = %e, "Worker halted, job left in a non-terminal status");
        }
        Ok((job_id, Err(e))) => {
            tracing::error!(%job_id, error = %e, "Worker stopped by store error");
        }
        Err(e) => {
            tracing::error!(error = %e, "Worker task failed");
        }
    }
}

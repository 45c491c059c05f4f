//! In-process [`JobStore`] with the same claim and guard semantics as the
//! PostgreSQL store.
//!
//! All handles from one [`MemoryBackend`] share a mutex-protected table, so
//! a claim is mutually exclusive across handles the way a skip-locked
//! claim is across connections. Faults can be injected per operation to
//! exercise store-outage handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use vigil_core::job::{ClaimedJob, JobError, JobStatus};
use vigil_core::types::{JobId, Timestamp};

use super::{JobStore, StoreConnector, StoreError};

/// Store operation, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Claim,
    MarkCompleting,
    MarkFailed,
    MarkCompleted,
    MarkCancelled,
}

/// A job row as held by the in-memory table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryJob {
    pub id: JobId,
    pub input: serde_json::Value,
    pub status: JobStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<JobError>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Default)]
struct Table {
    /// Insertion order doubles as creation order.
    jobs: Vec<MemoryJob>,
    faults: HashMap<Operation, usize>,
    connections: usize,
}

impl Table {
    fn take_fault(&mut self, op: Operation) -> Result<(), StoreError> {
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Unavailable(format!("injected {op:?} failure")))
            }
            _ => Ok(()),
        }
    }

    /// Apply `id: from -> to` when `guard(from)` holds, mirroring a guarded
    /// `UPDATE ... WHERE status ...`.
    fn transition(
        &mut self,
        op: Operation,
        id: JobId,
        to: JobStatus,
        guard: impl Fn(JobStatus) -> bool,
        update: impl FnOnce(&mut MemoryJob),
    ) -> Result<bool, StoreError> {
        self.take_fault(op)?;
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if !guard(job.status) || job.status.transition(id, to).is_err() {
            return Ok(false);
        }
        job.status = to;
        job.updated_at = chrono::Utc::now();
        update(job);
        Ok(true)
    }
}

/// Shared in-memory job table; also the [`StoreConnector`] for it.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    table: Arc<Mutex<Table>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // A panic while holding the lock leaves the table consistent: every
        // mutation completes before the guard is released.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a pending job and return its id.
    pub fn submit(&self, input: serde_json::Value) -> JobId {
        let now = chrono::Utc::now();
        let job = MemoryJob {
            id: JobId::new_v4(),
            input,
            status: JobStatus::Pending,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        self.lock().jobs.push(job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<MemoryJob> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    pub fn jobs(&self) -> Vec<MemoryJob> {
        self.lock().jobs.clone()
    }

    /// Make the next `times` calls of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: Operation, times: usize) {
        self.lock().faults.insert(op, times);
    }

    /// Number of handles opened so far.
    pub fn connections_opened(&self) -> usize {
        self.lock().connections
    }

    /// Open a handle without going through [`StoreConnector`].
    pub fn handle(&self) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryBackend {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore, StoreError> {
        let mut table = self.lock();
        table.take_fault(Operation::Connect)?;
        table.connections += 1;
        drop(table);
        Ok(self.handle())
    }
}

/// A handle onto a [`MemoryBackend`].
pub struct MemoryStore {
    backend: MemoryBackend,
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn claim_next(&mut self) -> Result<Option<ClaimedJob>, StoreError> {
        let mut table = self.backend.lock();
        table.take_fault(Operation::Claim)?;
        let oldest = table
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at);
        Ok(oldest.map(|job| {
            job.status = JobStatus::Running;
            job.updated_at = chrono::Utc::now();
            ClaimedJob {
                id: job.id,
                input: job.input.clone(),
            }
        }))
    }

    async fn mark_completing(
        &mut self,
        id: JobId,
        output: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let output = output.clone();
        self.backend.lock().transition(
            Operation::MarkCompleting,
            id,
            JobStatus::Completing,
            |s| s == JobStatus::Running,
            |job| job.output = Some(output),
        )
    }

    async fn mark_failed(&mut self, id: JobId, error: &JobError) -> Result<bool, StoreError> {
        let error = error.clone();
        self.backend.lock().transition(
            Operation::MarkFailed,
            id,
            JobStatus::Failed,
            |s| !s.is_terminal(),
            |job| job.error = Some(error),
        )
    }

    async fn mark_completed(&mut self, id: JobId) -> Result<bool, StoreError> {
        self.backend.lock().transition(
            Operation::MarkCompleted,
            id,
            JobStatus::Completed,
            |s| s == JobStatus::Completing,
            |_| {},
        )
    }

    async fn mark_cancelled(&mut self, id: JobId) -> Result<bool, StoreError> {
        self.backend.lock().transition(
            Operation::MarkCancelled,
            id,
            JobStatus::Cancelled,
            |s| !s.is_terminal(),
            |_| {},
        )
    }

    async fn close(self) -> Result<(), StoreError> {
        Ok(())
    }
}

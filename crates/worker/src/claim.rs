//! Claim loop: polls the store until a job is claimed or shutdown is
//! requested.
//!
//! When the queue is empty the loop sleeps a fixed `poll_interval`
//! between claims. A store error drops the connection; the next poll
//! opens a new one.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vigil_core::job::ClaimedJob;

use crate::store::{JobStore, StoreConnector, StoreError};

/// Default back-off between claims while the queue is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Owns one store handle and hands out claimed jobs.
pub struct ClaimLoop<C: StoreConnector> {
    connector: Arc<C>,
    store: Option<C::Store>,
    poll_interval: Duration,
}

impl<C: StoreConnector> ClaimLoop<C> {
    pub fn new(connector: Arc<C>, poll_interval: Duration) -> Self {
        Self {
            connector,
            store: None,
            poll_interval,
        }
    }

    /// Wait for the next claimed job.
    ///
    /// Returns `None` once `cancel` fires; no claim is started after that.
    pub async fn next_job(&mut self, cancel: &CancellationToken) -> Option<ClaimedJob> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            match self.try_claim().await {
                Ok(Some(job)) => {
                    tracing::info!(job_id = %job.id, "Job claimed");
                    return Some(job);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Claim failed, reconnecting on next poll");
                    self.reset();
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// The handle used for claims, opening one if needed.
    pub async fn store(&mut self) -> Result<&mut C::Store, StoreError> {
        match self.store {
            Some(ref mut store) => Ok(store),
            None => {
                let store = self.connector.connect().await?;
                tracing::debug!("Claim connection opened");
                Ok(self.store.insert(store))
            }
        }
    }

    /// Drop the current handle so the next call reconnects.
    pub fn reset(&mut self) {
        self.store = None;
    }

    /// Close the handle, if open.
    pub async fn close(&mut self) {
        if let Some(store) = self.store.take() {
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "Failed to close claim connection");
            }
        }
    }

    async fn try_claim(&mut self) -> Result<Option<ClaimedJob>, StoreError> {
        self.store().await?.claim_next().await
    }
}

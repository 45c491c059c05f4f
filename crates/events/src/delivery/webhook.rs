//! Webhook delivery of job outcomes.
//!
//! [`WebhookDelivery`] posts a JSON [`WebhookEnvelope`] to the caller's
//! URL via HTTP POST. A single attempt is made per call; any transport
//! error, timeout or non-2xx response is returned to the caller, which
//! decides what the failure means for the job.

use std::time::Duration;

use async_trait::async_trait;
use vigil_core::job::{JobError, WebhookEnvelope};
use vigil_core::types::JobId;

/// Default HTTP request timeout for a single delivery.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Delivers a job outcome to an external caller.
///
/// An empty `url` means the caller asked for no notification; that is a
/// successful no-op.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        url: &str,
        job_id: JobId,
        output: Option<&serde_json::Value>,
        error: Option<&JobError>,
    ) -> Result<(), WebhookError>;
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers job outcomes to external webhook endpoints.
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    /// Create a delivery service whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, envelope: &WebhookEnvelope<'_>) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(envelope).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookDelivery {
    async fn notify(
        &self,
        url: &str,
        job_id: JobId,
        output: Option<&serde_json::Value>,
        error: Option<&JobError>,
    ) -> Result<(), WebhookError> {
        if url.is_empty() {
            tracing::warn!(%job_id, "Webhook URL is empty, skipping delivery");
            return Ok(());
        }

        let envelope = WebhookEnvelope {
            job_id,
            data: output,
            error,
        };

        match self.try_send(url, &envelope).await {
            Ok(()) => {
                tracing::info!(%job_id, url, "Webhook delivered");
                Ok(())
            }
            Err(e) => {
                tracing::error!(%job_id, url, error = %e, "Webhook delivery failed");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

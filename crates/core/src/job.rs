//! Job lifecycle: status state machine, persisted error codes and the
//! webhook envelope.
//!
//! The six statuses are stored as lowercase text in the `jobs.status`
//! column. Every transition the dispatcher performs must be permitted by
//! [`JobStatus::can_transition_to`]; terminal statuses permit nothing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    /// Output persisted, webhook not yet confirmed.
    Completing,
    Completed,
    Failed,
    Cancelled,
}

/// Statuses from which no further transition is permitted.
pub const TERMINAL_STATUSES: [JobStatus; 3] = [
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

impl JobStatus {
    /// Database text representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Terminal statuses a job can be queued again from, as a new row.
    pub fn is_resubmittable(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Whether the directed transition graph has an edge `self -> next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completing)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Completing, Completed)
                | (Completing, Failed)
                | (Completing, Cancelled)
        )
    }

    /// Validate `self -> next` for job `id`, returning the new status.
    pub fn transition(self, id: JobId, next: JobStatus) -> Result<JobStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                id,
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completing" => Ok(Self::Completing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors persisted on the job row
// ---------------------------------------------------------------------------

/// Classification of a failed job, persisted as `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Inference preconditions not met; inference never ran.
    NoInput,
    /// The inference step returned an error or panicked.
    InferenceError,
    /// The webhook post failed after a successful inference.
    DeliveryError,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::NoInput => 400,
            Self::InferenceError => 100,
            Self::DeliveryError => 200,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoInput => "NO_INPUT",
            Self::InferenceError => "INFERENCE_ERROR",
            Self::DeliveryError => "DELIVERY_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The `{code, message}` object stored in `jobs.error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: i32,
    pub message: String,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Claimed job snapshot
// ---------------------------------------------------------------------------

/// The row snapshot returned by a successful claim.
///
/// `input` is opaque to the dispatcher apart from the `webhook_url` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub id: JobId,
    pub input: serde_json::Value,
}

impl ClaimedJob {
    /// Webhook URL from the input payload; empty when absent or not a string.
    pub fn webhook_url(&self) -> &str {
        self.input
            .get("webhook_url")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Webhook envelope
// ---------------------------------------------------------------------------

/// Outbound webhook body: `{job_id, data, error}`.
///
/// Exactly one of `data` / `error` is non-null; use the constructors.
#[derive(Debug, Serialize)]
pub struct WebhookEnvelope<'a> {
    pub job_id: JobId,
    pub data: Option<&'a serde_json::Value>,
    pub error: Option<&'a JobError>,
}

impl<'a> WebhookEnvelope<'a> {
    pub fn success(job_id: JobId, data: &'a serde_json::Value) -> Self {
        Self {
            job_id,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(job_id: JobId, error: &'a JobError) -> Self {
        Self {
            job_id,
            data: None,
            error: Some(error),
        }
    }
}

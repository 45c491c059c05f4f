//! Inference seam for the job executor, plus an Ollama-backed
//! vision-language implementation.
//!
//! The executor only sees [`Inference`]: `prepare` checks that a job has
//! what inference needs (its failure is reported as `NO_INPUT`), `infer`
//! produces the job output (its failure is reported as
//! `INFERENCE_ERROR`).

pub mod images;
pub mod ollama;
pub mod vlm;

use std::path::PathBuf;

use async_trait::async_trait;
use vigil_core::job::ClaimedJob;
use vigil_core::types::JobId;

pub use ollama::{OllamaClient, OllamaError};
pub use vlm::{VlmConfig, VlmInference};

/// Everything `infer` needs, produced by a successful `prepare`.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub job_id: JobId,
    pub input: serde_json::Value,
    /// Input artifacts discovered for the job, in processing order.
    pub artifacts: Vec<PathBuf>,
}

/// Inference preconditions not met.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("No images found")]
    NoImages(PathBuf),

    #[error("Failed to read input directory {dir}: {source}")]
    Unreadable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The inference step failed.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),

    #[error("Missing input parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sampling parameter is present but not usable.
    #[error("Invalid input parameter {key}: {value} (expected {expected})")]
    InvalidParameter {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// An external model-serving step.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Check preconditions and gather input artifacts. Must not call the
    /// model.
    async fn prepare(&self, job: &ClaimedJob) -> Result<InferenceRequest, InputError>;

    /// Run inference and return the job output.
    async fn infer(&self, request: &InferenceRequest) -> Result<serde_json::Value, InferenceError>;
}

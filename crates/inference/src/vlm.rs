//! Vision-language temporal reasoning over a job's images.
//!
//! Each image is described by the VLM model; the descriptions form a
//! CSV timeline (`id,timestamp,event`) that the LLM model then reasons
//! over with the caller's prompt. Output:
//! `{"logs": <timeline>, "temporal_output": <LLM response>}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use vigil_core::job::ClaimedJob;

use crate::images;
use crate::ollama::{GenerateOptions, GenerateRequest, OllamaClient};
use crate::{Inference, InferenceError, InferenceRequest, InputError};

/// Header line of the timeline handed to the LLM.
const TIMELINE_HEADER: &str = "id,timestamp,event\n";

/// Static settings for [`VlmInference`].
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// Root holding `input/<job_id>/` image directories.
    pub data_dir: PathBuf,
    pub vlm_model: String,
    pub llm_model: String,
    /// Defaults, overridable per job via `input.temperature` / `input.num_predict`.
    pub temperature: f64,
    pub num_predict: i32,
}

impl VlmConfig {
    pub fn input_dir(&self, job: &ClaimedJob) -> PathBuf {
        self.data_dir.join("input").join(job.id.to_string())
    }
}

/// Ollama-backed [`Inference`].
pub struct VlmInference {
    client: OllamaClient,
    config: VlmConfig,
}

/// Per-job parameters read from the opaque input payload.
#[derive(Debug, PartialEq)]
struct JobParams<'a> {
    vlm_prompt: &'a str,
    prompt: &'a str,
    options: GenerateOptions,
}

impl VlmInference {
    pub fn new(client: OllamaClient, config: VlmConfig) -> Self {
        Self { client, config }
    }

    async fn describe_image(
        &self,
        path: &Path,
        params: &JobParams<'_>,
    ) -> Result<String, InferenceError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| InferenceError::ImageRead {
                path: path.to_path_buf(),
                source,
            })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let response = self
            .client
            .generate(&GenerateRequest {
                model: &self.config.vlm_model,
                prompt: params.vlm_prompt,
                images: vec![encoded],
                options: Some(params.options),
                stream: false,
            })
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Inference for VlmInference {
    async fn prepare(&self, job: &ClaimedJob) -> Result<InferenceRequest, InputError> {
        let dir = self.config.input_dir(job);
        let artifacts = images::find_images(&dir).await?;
        if artifacts.is_empty() {
            tracing::warn!(job_id = %job.id, input_dir = %dir.display(), "No images found");
            return Err(InputError::NoImages(dir));
        }

        Ok(InferenceRequest {
            job_id: job.id,
            input: job.input.clone(),
            artifacts,
        })
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<serde_json::Value, InferenceError> {
        let params = job_params(&request.input, &self.config)?;

        tracing::info!(
            job_id = %request.job_id,
            vlm_model = %self.config.vlm_model,
            llm_model = %self.config.llm_model,
            temperature = params.options.temperature,
            num_predict = params.options.num_predict,
            image_count = request.artifacts.len(),
            "Running inference",
        );

        self.client.ensure_model(&self.config.vlm_model).await?;
        self.client.ensure_model(&self.config.llm_model).await?;

        let mut timeline = String::from(TIMELINE_HEADER);
        for path in &request.artifacts {
            let event = self.describe_image(path, &params).await?;
            tracing::debug!(job_id = %request.job_id, image = %path.display(), "Image described");
            timeline.push_str(&timeline_line(path, &event));
        }

        let temporal_prompt = temporal_prompt(&timeline, params.prompt);
        let temporal_output = self
            .client
            .generate(&GenerateRequest {
                model: &self.config.llm_model,
                prompt: &temporal_prompt,
                images: Vec::new(),
                options: None,
                stream: false,
            })
            .await?;

        tracing::info!(job_id = %request.job_id, "Inference completed");

        Ok(serde_json::json!({
            "logs": timeline,
            "temporal_output": temporal_output,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn job_params<'a>(
    input: &'a serde_json::Value,
    config: &VlmConfig,
) -> Result<JobParams<'a>, InferenceError> {
    let text = |key: &'static str| {
        input
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or(InferenceError::MissingParameter(key))
    };

    Ok(JobParams {
        vlm_prompt: text("vlm_prompt")?,
        prompt: text("prompt")?,
        options: GenerateOptions {
            temperature: temperature(input)?.unwrap_or(config.temperature),
            num_predict: num_predict(input)?.unwrap_or(config.num_predict),
        },
    })
}

/// `temperature` as a JSON number or numeric string. `None` when absent.
fn temperature(input: &serde_json::Value) -> Result<Option<f64>, InferenceError> {
    const KEY: &str = "temperature";
    let Some(value) = input.get(KEY) else {
        return Ok(None);
    };
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|t| t.is_finite())
        .map(Some)
        .ok_or_else(|| invalid(KEY, value, "a number"))
}

/// `num_predict` as a JSON integer or integer string within `i32`.
/// `None` when absent.
fn num_predict(input: &serde_json::Value) -> Result<Option<i32>, InferenceError> {
    const KEY: &str = "num_predict";
    let Some(value) = input.get(KEY) else {
        return Ok(None);
    };
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| i32::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| invalid(KEY, value, "a 32-bit integer"))
}

fn invalid(key: &'static str, value: &serde_json::Value, expected: &'static str) -> InferenceError {
    InferenceError::InvalidParameter {
        key,
        value: value.to_string(),
        expected,
    }
}

fn timeline_line(path: &Path, event: &str) -> String {
    format!(
        "\"{}\",\"{}\",\"{}\"\n",
        images::parse_image_id(path),
        images::parse_image_timestamp(path),
        event
    )
}

fn temporal_prompt(timeline: &str, prompt: &str) -> String {
    format!("Given the timeline in the format of id,timestamp,event\nTimeline:{timeline}\n{prompt}")
}

//! REST API client for an Ollama model server.
//!
//! Wraps the endpoints the VLM pipeline needs (model listing, model pull,
//! non-streaming generation) using [`reqwest`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP client for a single Ollama instance.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the Ollama REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Ollama returned a non-2xx status code.
    #[error("Ollama API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A pull finished without reporting success.
    #[error("Failed to pull model {model}: {status}")]
    PullFailed { model: String, status: String },
}

/// Sampling options forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub num_predict: i32,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// Base64-encoded images.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    status: String,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`)
    /// whose requests time out after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OllamaError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Names of the models available locally (`GET /api/tags`).
    pub async fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let list: ListModelsResponse = Self::ensure_success(response).await?.json().await?;
        Ok(list
            .models
            .into_iter()
            .map(|m| if m.model.is_empty() { m.name } else { m.model })
            .collect())
    }

    /// Pull a model and wait for the pull to finish (`POST /api/pull`).
    pub async fn pull_model(&self, model: &str) -> Result<(), OllamaError> {
        let body = serde_json::json!({ "model": model, "stream": false });
        let response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&body)
            .send()
            .await?;
        let pull: PullResponse = Self::ensure_success(response).await?.json().await?;
        if pull.status != "success" {
            return Err(OllamaError::PullFailed {
                model: model.to_string(),
                status: pull.status,
            });
        }
        Ok(())
    }

    /// Make sure `model` is present, pulling it if it is not listed.
    pub async fn ensure_model(&self, model: &str) -> Result<(), OllamaError> {
        if self.list_models().await?.iter().any(|m| m == model) {
            tracing::debug!(model, "Model already available");
            return Ok(());
        }
        tracing::info!(model, "Model not found, pulling");
        self.pull_model(model).await?;
        tracing::info!(model, "Model pulled");
        Ok(())
    }

    /// Run a non-streaming generation and return the response text.
    pub async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, OllamaError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await?;
        let generated: GenerateResponse = Self::ensure_success(response).await?.json().await?;
        Ok(generated.response)
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`OllamaError::ApiError`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, OllamaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OllamaError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_omits_empty_images_and_options() {
        let request = GenerateRequest {
            model: "llama3:latest",
            prompt: "p",
            images: Vec::new(),
            options: None,
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"model": "llama3:latest", "prompt": "p", "stream": false})
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OllamaClient::new("http://host:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://host:11434");
    }

    #[test]
    fn api_error_display() {
        let err = OllamaError::ApiError {
            status: 404,
            body: "model not found".into(),
        };
        assert_eq!(err.to_string(), "Ollama API error (404): model not found");
    }
}

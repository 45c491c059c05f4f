#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use vigil_core::job::{ClaimedJob, JobError};
use vigil_core::types::JobId;
use vigil_events::{Notifier, WebhookError};
use vigil_inference::{Inference, InferenceError, InferenceRequest, InputError, OllamaError};
use vigil_worker::JobExecutor;

// ---------------------------------------------------------------------------
// Fake inference
// ---------------------------------------------------------------------------

/// What [`FakeInference::infer`] does once called.
pub enum Behaviour {
    Succeed(serde_json::Value),
    /// Fails as an Ollama HTTP 500 with this body.
    Fail(String),
    Panic(String),
    /// Never returns; only cancellation ends the call.
    Block,
    /// Waits for the gate, then succeeds.
    Gated(Arc<Notify>, serde_json::Value),
}

pub struct FakeInference {
    behaviour: Behaviour,
    no_input: bool,
    delay: Duration,
    pub started: Notify,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeInference {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            no_input: false,
            delay: Duration::ZERO,
            started: Notify::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behaviour::Succeed(serde_json::json!({
            "logs": "id,timestamp,event\n",
            "temporal_output": "nothing happened"
        })))
    }

    /// `prepare` reports missing images.
    pub fn without_input(mut self) -> Self {
        self.no_input = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the call is dropped or panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Inference for FakeInference {
    async fn prepare(&self, job: &ClaimedJob) -> Result<InferenceRequest, InputError> {
        if self.no_input {
            return Err(InputError::NoImages(
                PathBuf::from("data/input").join(job.id.to_string()),
            ));
        }
        Ok(InferenceRequest {
            job_id: job.id,
            input: job.input.clone(),
            artifacts: Vec::new(),
        })
    }

    async fn infer(&self, _request: &InferenceRequest) -> Result<serde_json::Value, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.started.notify_one();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behaviour {
            Behaviour::Succeed(output) => Ok(output.clone()),
            Behaviour::Fail(body) => Err(OllamaError::ApiError {
                status: 500,
                body: body.clone(),
            }
            .into()),
            Behaviour::Panic(message) => panic!("{message}"),
            Behaviour::Block => std::future::pending().await,
            Behaviour::Gated(gate, output) => {
                gate.notified().await;
                Ok(output.clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub job_id: JobId,
    pub data: Option<serde_json::Value>,
    pub error: Option<JobError>,
}

/// Records every notification; optionally rejects non-empty URLs.
#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        url: &str,
        job_id: JobId,
        output: Option<&serde_json::Value>,
        error: Option<&JobError>,
    ) -> Result<(), WebhookError> {
        if url.is_empty() {
            return Ok(());
        }
        self.deliveries.lock().unwrap().push(Delivery {
            url: url.to_string(),
            job_id,
            data: output.cloned(),
            error: error.cloned(),
        });
        if self.fail {
            return Err(WebhookError::HttpStatus(502));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub const WEBHOOK: &str = "http://caller.test/hook";

pub fn executor(inference: &Arc<FakeInference>, notifier: &Arc<RecordingNotifier>) -> Arc<JobExecutor> {
    Arc::new(
        JobExecutor::new(Arc::clone(inference) as _, Arc::clone(notifier) as _)
            .with_retry_delay(Duration::from_millis(1)),
    )
}

pub fn input_with_webhook() -> serde_json::Value {
    serde_json::json!({"prompt": "what happened?", "webhook_url": WEBHOOK})
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

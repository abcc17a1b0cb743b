//! Speech synthesis against an asynchronous job API.
//!
//! A job is submitted, then polled until it reaches a terminal state. The
//! whole submit+poll cycle is retried on request-level failures only.

use crate::config::TtsSettings;
use crate::error::{RadioError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLLS: u32 = 30;
/// Total submit+poll attempts, including the first.
pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Rough speaking rate used when the backend does not report a duration.
pub const ESTIMATE_CHARS_PER_SEC: f64 = 15.0;
pub const MIN_ESTIMATE: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub audio_ref: String,
    /// True audio length, when the backend reports it.
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Queued, starting, processing, or any state we don't recognize.
    Running,
    Succeeded(JobOutput),
    Failed(String),
    Canceled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The backend answered synchronously.
    Finished(JobStatus),
    Queued(String),
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn submit(&self, request: &SpeechRequest) -> Result<Submission>;
    async fn poll(&self, job_id: &str) -> Result<JobStatus>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedClip {
    pub audio_ref: String,
    pub text: String,
    pub duration: Duration,
    /// True when `duration` came from the estimator rather than the backend.
    pub estimated: bool,
}

/// ~15 characters per second, never under one second.
///
/// This is an approximation: it ignores voice, speed and punctuation. The
/// orchestrator prefers decoded clip lengths when it has them.
pub fn estimate_speech_duration(text: &str) -> Duration {
    let chars = text.chars().count() as f64;
    Duration::from_secs_f64(chars / ESTIMATE_CHARS_PER_SEC).max(MIN_ESTIMATE)
}

pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    estimator: fn(&str) -> Duration,
    poll_interval: Duration,
    max_polls: u32,
    max_attempts: u32,
    backoff: Duration,
}

impl SpeechSynthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        SpeechSynthesizer {
            backend,
            estimator: estimate_speech_duration,
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            max_attempts: MAX_ATTEMPTS,
            backoff: RETRY_BACKOFF,
        }
    }

    /// Replace the fallback duration heuristic.
    pub fn with_estimator(mut self, estimator: fn(&str) -> Duration) -> Self {
        self.estimator = estimator;
        self
    }

    pub async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<SynthesizedClip> {
        let request = SpeechRequest {
            text: text.to_string(),
            voice: voice.to_string(),
            speed,
        };

        let mut attempt = 1;
        let output = loop {
            match self.attempt(&request).await {
                Ok(output) => break output,
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, "speech synthesis failed, retrying: {}", e);
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        let (duration, estimated) = match output.duration {
            Some(d) => (d, false),
            None => ((self.estimator)(text), true),
        };
        info!(voice, ?duration, estimated, "speech clip ready");
        Ok(SynthesizedClip {
            audio_ref: output.audio_ref,
            text: text.to_string(),
            duration,
            estimated,
        })
    }

    async fn attempt(&self, request: &SpeechRequest) -> Result<JobOutput> {
        let job_id = match self.backend.submit(request).await? {
            Submission::Finished(status) => {
                return match status {
                    JobStatus::Running => {
                        Err(RadioError::Transport("backend returned no job id".into()))
                    }
                    terminal => settle(terminal, ""),
                };
            }
            Submission::Queued(id) if id.trim().is_empty() => {
                return Err(RadioError::Transport("backend returned no job id".into()));
            }
            Submission::Queued(id) => id,
        };

        debug!(job = %job_id, "speech job queued");
        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            match self.backend.poll(&job_id).await? {
                JobStatus::Running => debug!(job = %job_id, poll, "speech job still running"),
                terminal => return settle(terminal, &job_id),
            }
        }

        Err(RadioError::Timeout {
            job_id,
            attempts: self.max_polls,
        })
    }
}

fn settle(status: JobStatus, job_id: &str) -> Result<JobOutput> {
    match status {
        JobStatus::Succeeded(output) if output.audio_ref.is_empty() => Err(RadioError::Parse(
            format!("speech job {} succeeded without output", job_id),
        )),
        JobStatus::Succeeded(output) => Ok(output),
        JobStatus::Failed(reason) => Err(RadioError::JobFailed(reason)),
        JobStatus::Canceled => Err(RadioError::JobCanceled),
        JobStatus::Running => Err(RadioError::Transport(format!("job {} not finished", job_id))),
    }
}

/// Prediction-style job API: `POST {base}/predictions` then
/// `GET {base}/predictions/{id}`.
pub struct HttpSpeechBackend {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: &'a SpeechRequest,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
}

impl HttpSpeechBackend {
    pub fn from_settings(settings: &TtsSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        HttpSpeechBackend {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.resolved_key(),
            client,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RadioError::Configuration("no speech synthesis API key".to_string()))
    }

    async fn read_prediction(res: reqwest::Response) -> Result<Prediction> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RadioError::Transport(format!(
                "speech backend returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        res.json::<Prediction>()
            .await
            .map_err(|e| RadioError::Transport(format!("speech backend response: {}", e)))
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn submit(&self, request: &SpeechRequest) -> Result<Submission> {
        let key = self.key()?;
        let res = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .bearer_auth(key)
            .header("Prefer", "wait=5")
            .json(&PredictionRequest {
                version: &self.model,
                input: request,
            })
            .send()
            .await?;
        let prediction = Self::read_prediction(res).await?;
        let status = prediction.job_status()?;
        match (status, prediction.id) {
            (JobStatus::Running, Some(id)) => Ok(Submission::Queued(id)),
            (JobStatus::Running, None) => {
                Err(RadioError::Transport("backend returned no job id".into()))
            }
            (terminal, _) => Ok(Submission::Finished(terminal)),
        }
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus> {
        let key = self.key()?;
        let res = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, job_id))
            .bearer_auth(key)
            .send()
            .await?;
        Self::read_prediction(res).await?.job_status()
    }
}

impl Prediction {
    fn job_status(&self) -> Result<JobStatus> {
        Ok(match self.status.as_str() {
            "succeeded" => JobStatus::Succeeded(parse_output(&self.output)?),
            "failed" => JobStatus::Failed(
                self.error
                    .as_ref()
                    .map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Running,
        })
    }
}

/// Accepts `"url"`, `["url", ...]` or `{"audio"|"audio_out"|"url": ..., "duration": secs}`.
fn parse_output(output: &Value) -> Result<JobOutput> {
    match output {
        Value::String(url) => Ok(JobOutput {
            audio_ref: url.clone(),
            duration: None,
        }),
        Value::Array(items) => items
            .iter()
            .find_map(Value::as_str)
            .map(|url| JobOutput {
                audio_ref: url.to_string(),
                duration: None,
            })
            .ok_or_else(|| RadioError::Parse("speech output list has no URL".into())),
        Value::Object(map) => {
            let audio_ref = ["audio", "audio_out", "url"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .ok_or_else(|| RadioError::Parse("speech output has no audio field".into()))?;
            let duration = map
                .get("duration")
                .and_then(Value::as_f64)
                .filter(|d| d.is_finite() && *d > 0.0)
                .map(Duration::from_secs_f64);
            Ok(JobOutput {
                audio_ref: audio_ref.to_string(),
                duration,
            })
        }
        _ => Err(RadioError::Parse("speech job succeeded without output".into())),
    }
}

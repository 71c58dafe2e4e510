//! HTTP transport for Ollama-compatible model servers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use super::{Endpoint, GenerativeBackend, TransportFailure};
use crate::config::GenerationParams;
use crate::error::PipelineError;

/// Body of `POST /api/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
  pub model: &'a str,
  pub prompt: &'a str,
  pub stream: bool,
  pub options: GenerateOptions,
}

#[derive(Debug, Serialize)]
pub struct GenerateOptions {
  pub temperature: f32,
  pub seed: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub num_predict: Option<u32>,
}

impl<'a> GenerateRequest<'a> {
  pub fn new(prompt: &'a str, params: &'a GenerationParams) -> Self {
    Self {
      model: &params.model,
      prompt,
      stream: false,
      options: GenerateOptions {
        temperature: params.temperature,
        seed: params.seed,
        num_predict: params.max_tokens,
      },
    }
  }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
  #[serde(default)]
  models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
struct TagsModel {
  name: String,
}

/// Non-streaming Ollama client. Performs exactly one HTTP request per call;
/// timeouts and retries belong to [super::BackendClient].
#[derive(Debug, Clone)]
pub struct OllamaBackend {
  http: reqwest::Client,
}

impl OllamaBackend {
  /// `connect_timeout` bounds connection setup only.
  pub fn new(connect_timeout: Duration) -> Result<Self, PipelineError> {
    let http = reqwest::Client::builder()
      .connect_timeout(connect_timeout)
      .build()
      .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;
    Ok(Self { http })
  }

  /// Names of the models served at `endpoint` (`GET /api/tags`).
  #[instrument(level = "trace", skip(self), fields(endpoint = %endpoint))]
  pub async fn list_models(&self, endpoint: &Endpoint) -> Result<Vec<String>, TransportFailure> {
    let url = format!("{}/api/tags", endpoint.url);
    let response = self.http.get(&url).send().await.map_err(request_failure)?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(status_failure(status.as_u16(), body));
    }
    let tags: TagsResponse = response
      .json()
      .await
      .map_err(|e| TransportFailure::Decode(e.to_string()))?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
  }
}

#[async_trait]
impl GenerativeBackend for OllamaBackend {
  #[instrument(level = "trace", skip(self, prompt, params), fields(endpoint = %endpoint, model = %params.model))]
  async fn generate(
    &self,
    endpoint: &Endpoint,
    prompt: &str,
    params: &GenerationParams,
  ) -> Result<String, TransportFailure> {
    let url = format!("{}/api/generate", endpoint.url);
    let body = GenerateRequest::new(prompt, params);
    let response = self
      .http
      .post(&url)
      .json(&body)
      .send()
      .await
      .map_err(request_failure)?;
    let status = response.status();
    trace!(status = status.as_u16(), "ollama responded");
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(status_failure(status.as_u16(), body));
    }
    let parsed: GenerateResponse = response
      .json()
      .await
      .map_err(|e| TransportFailure::Decode(e.to_string()))?;
    Ok(parsed.response)
  }
}

fn request_failure(e: reqwest::Error) -> TransportFailure {
  if e.is_timeout() {
    TransportFailure::Timeout(e.to_string())
  } else if e.is_decode() {
    TransportFailure::Decode(e.to_string())
  } else {
    // Connect errors and connections dropped mid-request.
    TransportFailure::Connect(e.to_string())
  }
}

/// Ollama answers 404 with `{"error":"model '...' not found"}` for unknown models.
fn status_failure(status: u16, body: String) -> TransportFailure {
  match status {
    404 => TransportFailure::ModelUnavailable(if body.is_empty() {
      "404 not found".to_string()
    } else {
      body
    }),
    500..=599 => TransportFailure::Server { status, body },
    _ => TransportFailure::Rejected { status, body },
  }
}

//! Generative backend: the transport seam and the retrying client built on it.
//!
//! [GenerativeBackend] is the raw request/response service (one HTTP call, no
//! retries). [BackendClient] targets one [Endpoint] and adds timeout, bounded
//! retry with backoff, and per-attempt [crate::types::BackendExchange] records.

mod client;
mod ollama;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GenerationParams, RunConfig};

pub use client::{BackendClient, ExchangeRecorder, Generation};
pub use ollama::OllamaBackend;

/// Which of the two model-serving instances an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
  /// Reserved for components outside the pipeline core.
  Planning,
  /// Used by every generative stage worker.
  Execution,
}

/// An addressable model-serving endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
  pub role: EndpointRole,
  pub url: String,
}

impl Endpoint {
  pub fn new(role: EndpointRole, url: impl Into<String>) -> Self {
    Self {
      role,
      url: url.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn from_config(config: &RunConfig, role: EndpointRole) -> Self {
    match role {
      EndpointRole::Planning => Self::new(role, &config.planning_endpoint),
      EndpointRole::Execution => Self::new(role, &config.execution_endpoint),
    }
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url)
  }
}

/// Why a single transport call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
  Timeout(String),
  Connect(String),
  /// 5xx from the server.
  Server { status: u16, body: String },
  /// The requested model is not served by this endpoint.
  ModelUnavailable(String),
  /// Any other non-success status.
  Rejected { status: u16, body: String },
  /// Response could not be decoded.
  Decode(String),
}

impl TransportFailure {
  /// Transient failures are retried by [BackendClient]; the rest surface at once.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      TransportFailure::Timeout(_) | TransportFailure::Connect(_) | TransportFailure::Server { .. }
    )
  }
}

impl fmt::Display for TransportFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TransportFailure::Timeout(m) => write!(f, "timeout: {}", m),
      TransportFailure::Connect(m) => write!(f, "connection failed: {}", m),
      TransportFailure::Server { status, body } => write!(f, "server error {}: {}", status, body),
      TransportFailure::ModelUnavailable(m) => write!(f, "model unavailable: {}", m),
      TransportFailure::Rejected { status, body } => {
        write!(f, "request rejected {}: {}", status, body)
      }
      TransportFailure::Decode(m) => write!(f, "invalid response: {}", m),
    }
  }
}

/// Opaque request/response generation service.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
  /// Sends one generate request to `endpoint`. Implementations must not retry.
  async fn generate(
    &self,
    endpoint: &Endpoint,
    prompt: &str,
    params: &GenerationParams,
  ) -> Result<String, TransportFailure>;
}

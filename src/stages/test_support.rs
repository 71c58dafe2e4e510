//! Scripted backend and workspace fixtures for stage and loop tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BackendClient, Endpoint, EndpointRole, GenerativeBackend, TransportFailure};
use crate::config::{GenerationParams, RetryPolicy, RunConfig};
use crate::types::ParsedDocument;
use crate::workspace::RunWorkspace;

/// Answers every prompt with `<label>: <prompt length>` unless the prompt
/// contains one of the configured markers, in which case it fails.
pub(crate) struct ScriptedBackend {
  label: String,
  failures: Vec<(String, TransportFailure)>,
  prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
  pub(crate) fn new(label: &str) -> Self {
    Self {
      label: label.to_string(),
      failures: vec![],
      prompts: Mutex::new(vec![]),
    }
  }

  pub(crate) fn failing_on(mut self, marker: &str, failure: TransportFailure) -> Self {
    self.failures.push((marker.to_string(), failure));
    self
  }

  pub(crate) fn prompts(&self) -> Vec<String> {
    self.prompts.lock().unwrap().clone()
  }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
  async fn generate(
    &self,
    _endpoint: &Endpoint,
    prompt: &str,
    _params: &GenerationParams,
  ) -> Result<String, TransportFailure> {
    self.prompts.lock().unwrap().push(prompt.to_string());
    for (marker, failure) in &self.failures {
      if prompt.contains(marker.as_str()) {
        return Err(failure.clone());
      }
    }
    Ok(format!("{}: {}", self.label, prompt.chars().count()))
  }
}

pub(crate) fn unavailable() -> TransportFailure {
  TransportFailure::ModelUnavailable("model 'llama3.1' not found".to_string())
}

/// Config with instant retries.
pub(crate) fn test_config() -> RunConfig {
  RunConfig {
    retry: RetryPolicy {
      max_retries: 2,
      base_delay_ms: 0,
      max_delay_ms: 0,
    },
    ..RunConfig::default()
  }
}

pub(crate) fn client(backend: Arc<dyn GenerativeBackend>) -> BackendClient {
  BackendClient::new(
    backend,
    Endpoint::new(EndpointRole::Execution, "http://stub"),
    test_config().retry,
    Duration::from_secs(5),
  )
  .without_jitter()
}

pub(crate) fn workspace(out: &Path) -> RunWorkspace {
  RunWorkspace::create(out).unwrap()
}

pub(crate) fn parsed(id: &str) -> ParsedDocument {
  ParsedDocument {
    id: id.to_string(),
    filename: format!("{}.txt", id),
    title: format!("Title of {}", id),
    author: "A. Author".to_string(),
    text: format!("Body of {} with enough words to summarize.", id),
  }
}

/// Writes `<name>` files with the given contents into `dir`.
pub(crate) fn write_sources(dir: &Path, files: &[(&str, &str)]) {
  for (name, contents) in files {
    std::fs::write(dir.join(name), contents).unwrap();
  }
}

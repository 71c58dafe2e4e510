//! Shared fixtures for integration tests: a deterministic stub backend and a
//! small document corpus.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use research_copilot::backend::{Endpoint, GenerativeBackend, TransportFailure};
use research_copilot::config::{GenerationParams, RetryPolicy, RunConfig};

/// Deterministic backend: the answer depends only on the prompt, the model
/// parameters and `flavor`. Prompts containing a failing marker are refused.
pub struct StubBackend {
  flavor: String,
  failing: Vec<(String, TransportFailure)>,
  calls: Mutex<usize>,
}

impl StubBackend {
  pub fn new(flavor: &str) -> Self {
    Self {
      flavor: flavor.to_string(),
      failing: vec![],
      calls: Mutex::new(0),
    }
  }

  pub fn failing_on(mut self, marker: &str, failure: TransportFailure) -> Self {
    self.failing.push((marker.to_string(), failure));
    self
  }

  pub fn calls(&self) -> usize {
    *self.calls.lock().unwrap()
  }
}

#[async_trait]
impl GenerativeBackend for StubBackend {
  async fn generate(
    &self,
    _endpoint: &Endpoint,
    prompt: &str,
    params: &GenerationParams,
  ) -> Result<String, TransportFailure> {
    *self.calls.lock().unwrap() += 1;
    if let Some((_, failure)) = self.failing.iter().find(|(m, _)| prompt.contains(m.as_str())) {
      return Err(failure.clone());
    }
    let checksum: u64 = prompt.bytes().map(u64::from).sum();
    Ok(format!(
      "[{} seed={} t={}] {} chars, checksum {}",
      self.flavor,
      params.seed,
      params.temperature,
      prompt.chars().count(),
      checksum
    ))
  }
}

pub fn model_missing() -> TransportFailure {
  TransportFailure::ModelUnavailable("model 'llama3.1' not found".to_string())
}

/// Config with instant retries so failing stubs do not slow tests down.
pub fn fast_config() -> RunConfig {
  RunConfig {
    retry: RetryPolicy {
      max_retries: 2,
      base_delay_ms: 0,
      max_delay_ms: 0,
    },
    ..RunConfig::default()
  }
}

/// Five documents, `paper_c.txt` unreadable (no text).
pub fn write_corpus(dir: &Path) {
  let files = [
    ("paper_a.txt", "Attention Is All You Need\nAuthors: Vaswani et al.\n\nTransformers replace recurrence with attention."),
    ("paper_b.md", "# Deep Residual Learning\nAuthor: He et al.\n\nResidual connections ease optimisation."),
    ("paper_c.txt", "\n   \n"),
    ("paper_d.txt", "BERT\nAuthors: Devlin et al.\n\nBidirectional pre-training of transformers."),
    ("paper_e.txt", "Scaling Laws for Neural Language Models\n\nLoss follows a power law in compute."),
  ];
  for (name, text) in files {
    std::fs::write(dir.join(name), text).unwrap();
  }
}

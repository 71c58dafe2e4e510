//! Run configuration: defaults, JSON file loading, environment overrides, validation.
//!
//! A [RunConfig] is assembled before the run starts and then frozen into the
//! workspace as `config.json`; nothing mutates it afterwards.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::PipelineError;
use crate::types::Stage;

pub const DEFAULT_MODEL: &str = "llama3.1";
pub const DEFAULT_PLANNING_ENDPOINT: &str = "http://127.0.0.1:11434";
pub const DEFAULT_EXECUTION_ENDPOINT: &str = "http://127.0.0.1:11435";

/// Environment variable names read by [RunConfig::apply_env_overrides].
pub const ENV_MODEL: &str = "COPILOT_MODEL";
pub const ENV_PLANNING_HOST: &str = "COPILOT_PLANNING_HOST";
pub const ENV_EXECUTION_HOST: &str = "COPILOT_EXECUTION_HOST";

/// Bounded retry with exponential backoff for transient backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay_ms: 500,
      max_delay_ms: 8_000,
    }
  }
}

impl RetryPolicy {
  /// Total attempts allowed for one call.
  pub fn max_attempts(&self) -> u32 {
    self.max_retries.saturating_add(1)
  }

  /// Delay before retry number `retry` (1-based), without jitter.
  pub fn backoff(&self, retry: u32) -> Duration {
    let factor = 1u64 << retry.saturating_sub(1).min(16);
    let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
    Duration::from_millis(ms)
  }
}

/// Per-stage acceptance of usable partial output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialFailurePolicy {
  accept: BTreeMap<Stage, bool>,
}

impl Default for PartialFailurePolicy {
  /// Parse and summarize keep going with the documents that worked; synthesis
  /// and survey are single-call stages with no meaningful partial output.
  fn default() -> Self {
    Self {
      accept: BTreeMap::from([
        (Stage::Parse, true),
        (Stage::Summarize, true),
        (Stage::Synthesize, false),
        (Stage::Survey, false),
      ]),
    }
  }
}

impl PartialFailurePolicy {
  pub fn accepts(&self, stage: Stage) -> bool {
    self.accept.get(&stage).copied().unwrap_or(false)
  }

  pub fn with_stage(mut self, stage: Stage, accept: bool) -> Self {
    self.accept.insert(stage, accept);
    self
  }
}

/// Model parameters sent with every generate call, taken verbatim from [RunConfig].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
  pub model: String,
  pub temperature: f32,
  pub seed: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
}

/// Immutable snapshot of everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
  pub model: String,
  pub backend: String,
  pub temperature: f32,
  pub seed: u64,
  pub planning_endpoint: String,
  pub execution_endpoint: String,
  pub max_documents: usize,
  pub survey_word_limit: usize,
  pub summary_input_chars: usize,
  pub synthesis_chars_per_summary: usize,
  pub survey_synthesis_chars: usize,
  pub max_output_tokens: Option<u32>,
  pub request_timeout_secs: u64,
  pub retry: RetryPolicy,
  pub summarizer_concurrency: usize,
  pub partial_failure: PartialFailurePolicy,
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      model: DEFAULT_MODEL.to_string(),
      backend: "ollama".to_string(),
      temperature: 0.7,
      seed: 42,
      planning_endpoint: DEFAULT_PLANNING_ENDPOINT.to_string(),
      execution_endpoint: DEFAULT_EXECUTION_ENDPOINT.to_string(),
      max_documents: 6,
      survey_word_limit: 800,
      summary_input_chars: 15_000,
      synthesis_chars_per_summary: 1_000,
      survey_synthesis_chars: 2_000,
      max_output_tokens: None,
      request_timeout_secs: 300,
      retry: RetryPolicy::default(),
      summarizer_concurrency: 2,
      partial_failure: PartialFailurePolicy::default(),
    }
  }
}

impl RunConfig {
  /// Loads a (possibly partial) JSON config file; missing fields take defaults.
  #[instrument(level = "trace", skip(path))]
  pub fn load(path: &Path) -> Result<Self, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let config: RunConfig = serde_json::from_slice(&bytes)?;
    Ok(config)
  }

  /// Applies `COPILOT_*` overrides using `lookup` (normally `std::env::var`).
  pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
      self.model = model;
    }
    if let Some(host) = lookup(ENV_PLANNING_HOST).filter(|v| !v.trim().is_empty()) {
      self.planning_endpoint = host;
    }
    if let Some(host) = lookup(ENV_EXECUTION_HOST).filter(|v| !v.trim().is_empty()) {
      self.execution_endpoint = host;
    }
  }

  pub fn validate(&self) -> Result<(), PipelineError> {
    if self.model.trim().is_empty() {
      return Err(PipelineError::Config("model must not be empty".to_string()));
    }
    if !(0.0..=2.0).contains(&self.temperature) {
      return Err(PipelineError::Config(format!(
        "temperature {} is outside [0, 2]",
        self.temperature
      )));
    }
    for (name, url) in [
      ("planning_endpoint", &self.planning_endpoint),
      ("execution_endpoint", &self.execution_endpoint),
    ] {
      if url.trim().is_empty() {
        return Err(PipelineError::Config(format!("{} must not be empty", name)));
      }
    }
    if self.summarizer_concurrency == 0 {
      return Err(PipelineError::Config(
        "summarizer_concurrency must be at least 1".to_string(),
      ));
    }
    if self.request_timeout_secs == 0 {
      return Err(PipelineError::Config(
        "request_timeout_secs must be at least 1".to_string(),
      ));
    }
    if self.max_documents == 0 {
      return Err(PipelineError::Config(
        "max_documents must be at least 1".to_string(),
      ));
    }
    Ok(())
  }

  pub fn generation_params(&self) -> GenerationParams {
    GenerationParams {
      model: self.model.clone(),
      temperature: self.temperature,
      seed: self.seed,
      max_tokens: self.max_output_tokens,
    }
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

//! Error taxonomy for the pipeline and the generative backend client.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

/// Failure surfaced by the backend client after its own retry policy ran.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
  /// Backend unreachable or timed out; retried with backoff before surfacing.
  #[error("transport error at {endpoint} after {attempts} attempt(s): {message}")]
  Transport {
    endpoint: String,
    attempts: u32,
    message: String,
  },
  /// Model or endpoint is not serving; never retried.
  #[error("backend unavailable at {endpoint}: {message}")]
  Unavailable { endpoint: String, message: String },
}

impl BackendError {
  pub fn is_transient(&self) -> bool {
    matches!(self, BackendError::Transport { .. })
  }
}

/// Errors that stop a run (or a library call) and reach the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// No valid next stage although the pipeline is incomplete, or a transition
  /// that breaks the stage ordering. Always fatal.
  #[error("state inconsistency: {0}")]
  StateInconsistency(String),

  #[error("stage {stage} produced partial output that downstream stages cannot use: {detail}")]
  PartialFailure { stage: Stage, detail: String },

  #[error("stage {stage} failed: {detail}")]
  StageFailed { stage: Stage, detail: String },

  #[error("run cancelled{}", .next.map(|s| format!(" before stage {}", s)).unwrap_or_default())]
  Cancelled { next: Option<Stage> },

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("I/O error on {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("trace log error: {0}")]
  Trace(String),
}

impl PipelineError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    PipelineError::Io {
      path: path.into(),
      source,
    }
  }

  /// Short machine-readable name written as `error_kind` in trace records.
  pub fn kind(&self) -> &'static str {
    match self {
      PipelineError::StateInconsistency(_) => "state_inconsistency",
      PipelineError::PartialFailure { .. } => "partial_failure",
      PipelineError::StageFailed { .. } => "stage_failed",
      PipelineError::Cancelled { .. } => "cancelled",
      PipelineError::Config(_) => "config_error",
      PipelineError::Io { .. } => "io_error",
      PipelineError::Serialization(_) => "serialization_error",
      PipelineError::Trace(_) => "trace_error",
    }
  }
}

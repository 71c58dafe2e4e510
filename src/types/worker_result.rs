//! Outcome of one stage execution, handed from a worker to the execution loop.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ArtifactRef, BackendExchange};

/// How a stage execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultKind {
  Success,
  /// Some but not all expected artifacts were produced. `usable` is the worker's
  /// declaration that downstream stages can run on what was produced.
  PartialFailure { usable: bool },
  Failure,
}

impl ResultKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResultKind::Success => "success",
      ResultKind::PartialFailure { .. } => "partial_failure",
      ResultKind::Failure => "failure",
    }
  }
}

impl fmt::Display for ResultKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Category of a per-item failure absorbed by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
  ExtractionError,
  TransportError,
  BackendUnavailable,
}

impl ItemErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ItemErrorKind::ExtractionError => "extraction_error",
      ItemErrorKind::TransportError => "transport_error",
      ItemErrorKind::BackendUnavailable => "backend_unavailable",
    }
  }
}

/// A document-level failure that did not stop the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
  pub source_id: String,
  pub kind: ItemErrorKind,
  pub message: String,
}

impl ItemError {
  pub fn new(source_id: impl Into<String>, kind: ItemErrorKind, message: impl Into<String>) -> Self {
    Self {
      source_id: source_id.into(),
      kind,
      message: message.into(),
    }
  }
}

/// Result of executing one stage.
#[derive(Debug, Clone)]
pub struct WorkerResult {
  pub kind: ResultKind,
  pub artifacts: Vec<ArtifactRef>,
  pub detail: String,
  /// Backend attempts made during the stage; attached by the loop from the
  /// stage's exchange recorder.
  pub exchanges: Vec<BackendExchange>,
  pub item_errors: Vec<ItemError>,
}

impl WorkerResult {
  pub fn success(detail: impl Into<String>, artifacts: Vec<ArtifactRef>) -> Self {
    Self::new(ResultKind::Success, detail, artifacts)
  }

  pub fn partial(usable: bool, detail: impl Into<String>, artifacts: Vec<ArtifactRef>) -> Self {
    Self::new(ResultKind::PartialFailure { usable }, detail, artifacts)
  }

  pub fn failure(detail: impl Into<String>) -> Self {
    Self::new(ResultKind::Failure, detail, vec![])
  }

  fn new(kind: ResultKind, detail: impl Into<String>, artifacts: Vec<ArtifactRef>) -> Self {
    Self {
      kind,
      artifacts,
      detail: detail.into(),
      exchanges: vec![],
      item_errors: vec![],
    }
  }

  pub fn with_item_errors(mut self, item_errors: Vec<ItemError>) -> Self {
    self.item_errors = item_errors;
    self
  }

  /// Picks Success / PartialFailure / Failure from how many items made it.
  /// Partial output is declared usable when at least one item succeeded.
  pub fn from_counts(
    succeeded: usize,
    attempted: usize,
    detail: impl Into<String>,
    artifacts: Vec<ArtifactRef>,
  ) -> Self {
    if succeeded == 0 {
      let mut r = Self::failure(detail);
      r.artifacts = artifacts;
      r
    } else if succeeded < attempted {
      Self::partial(true, detail, artifacts)
    } else {
      Self::success(detail, artifacts)
    }
  }
}

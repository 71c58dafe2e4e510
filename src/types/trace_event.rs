//! DTOs for trace.jsonl: one record per line, append-only.
//!
//! Each record carries `seq`, `timestamp`, `event_type` and a `data` payload whose
//! shape depends on `event_type`. The typed payload structs below are what the
//! execution loop writes and what replay reads back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactRef, PipelineState, Stage};

/// Kind of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
  StateInit,
  Decision,
  Dispatch,
  BackendCall,
  BackendResponse,
  StageResult,
  Error,
  RunComplete,
}

impl TraceEventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TraceEventKind::StateInit => "state_init",
      TraceEventKind::Decision => "decision",
      TraceEventKind::Dispatch => "dispatch",
      TraceEventKind::BackendCall => "backend_call",
      TraceEventKind::BackendResponse => "backend_response",
      TraceEventKind::StageResult => "stage_result",
      TraceEventKind::Error => "error",
      TraceEventKind::RunComplete => "run_complete",
    }
  }
}

impl fmt::Display for TraceEventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One line of trace.jsonl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
  /// 1-based, strictly increasing within a trace file.
  pub seq: u64,
  pub timestamp: DateTime<Utc>,
  pub event_type: TraceEventKind,
  pub data: serde_json::Value,
}

/// `state_init`: state snapshot at run start (or at resume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInitData {
  pub run_id: String,
  pub resumed: bool,
  pub state: PipelineState,
}

/// What the selection step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
  Dispatch,
  Complete,
  Stopped,
}

/// `decision`: the selected stage and the state that produced the choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionData {
  pub stage: Option<Stage>,
  pub outcome: DecisionOutcome,
  pub state: PipelineState,
}

/// `dispatch`: stage handed to its worker with these predecessor artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchData {
  pub stage: Stage,
  pub worker: String,
  pub inputs: Vec<ArtifactRef>,
}

/// `backend_call`: request about to be (or that was) sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCallData {
  pub stage: Stage,
  pub source_id: Option<String>,
  pub endpoint: String,
  pub attempt: u32,
  pub sent_at: DateTime<Utc>,
  pub prompt: String,
}

/// `backend_response`: generated text for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponseData {
  pub stage: Stage,
  pub source_id: Option<String>,
  pub endpoint: String,
  pub attempt: u32,
  pub elapsed_ms: u64,
  pub response: String,
}

/// Severity attached to stage results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
  Info,
  Warning,
  Error,
}

/// `stage_result`: how the stage ended and whether the loop marked it completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResultData {
  pub stage: Stage,
  pub kind: String,
  pub completed: bool,
  pub level: TraceLevel,
  pub artifacts: Vec<ArtifactRef>,
  pub detail: String,
}

/// `error`: any failure, from a single document up to a run abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
  pub stage: Option<Stage>,
  pub error_kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attempt: Option<u32>,
  pub message: String,
  /// True when the error ended the run.
  pub fatal: bool,
}

/// `run_complete`: final status of this invocation of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompleteData {
  pub status: String,
  pub completed_stages: Vec<Stage>,
}

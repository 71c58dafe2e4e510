//! Tests for trace DTOs.

use chrono::{TimeZone, Utc};

use super::{
  DecisionData, DecisionOutcome, ErrorData, PipelineState, Stage, StageGraph, TraceEvent,
  TraceEventKind,
};

#[test]
fn trace_event_serializes_required_fields() {
  let event = TraceEvent {
    seq: 1,
    timestamp: Utc.with_ymd_and_hms(2026, 2, 14, 10, 0, 0).unwrap(),
    event_type: TraceEventKind::StateInit,
    data: serde_json::json!({"run_id": "r"}),
  };
  let json = serde_json::to_string(&event).unwrap();
  let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
  assert_eq!(parsed["seq"], 1);
  assert_eq!(parsed["event_type"], "state_init");
  assert_eq!(parsed["timestamp"], "2026-02-14T10:00:00Z");
  assert_eq!(parsed["data"]["run_id"], "r");
}

#[test]
fn kind_names_match_serde() {
  for kind in [
    TraceEventKind::StateInit,
    TraceEventKind::Decision,
    TraceEventKind::Dispatch,
    TraceEventKind::BackendCall,
    TraceEventKind::BackendResponse,
    TraceEventKind::StageResult,
    TraceEventKind::Error,
    TraceEventKind::RunComplete,
  ] {
    assert_eq!(
      serde_json::to_value(kind).unwrap(),
      serde_json::Value::String(kind.to_string())
    );
  }
}

#[test]
fn decision_data_carries_state_snapshot() {
  let data = DecisionData {
    stage: Some(Stage::Parse),
    outcome: DecisionOutcome::Dispatch,
    state: PipelineState::new(&StageGraph::standard()),
  };
  let v = serde_json::to_value(&data).unwrap();
  assert_eq!(v["stage"], "parse");
  assert_eq!(v["outcome"], "dispatch");
  assert_eq!(v["state"]["completed"]["parse"], false);
}

#[test]
fn error_data_omits_empty_optionals() {
  let data = ErrorData {
    stage: None,
    error_kind: "state_inconsistency".to_string(),
    source_id: None,
    endpoint: None,
    attempt: None,
    message: "no valid next stage".to_string(),
    fatal: true,
  };
  let v = serde_json::to_value(&data).unwrap();
  assert!(v.get("source_id").is_none());
  assert!(v.get("attempt").is_none());
  assert_eq!(v["fatal"], true);
}

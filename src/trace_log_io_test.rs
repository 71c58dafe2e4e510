//! Tests for the trace log writer, loader and replay.

use std::io::Write;

use crate::error::PipelineError;
use crate::trace_log_io::{TraceLog, load_trace, parse_trace, replay_state};
use crate::types::{
  ArtifactKind, ArtifactRef, PipelineState, Stage, StageGraph, StageResultData, StateInitData,
  TraceEventKind, TraceLevel,
};

fn init(state: PipelineState, resumed: bool) -> StateInitData {
  StateInitData {
    run_id: "run-1".to_string(),
    resumed,
    state,
  }
}

fn stage_result(stage: Stage, completed: bool) -> StageResultData {
  StageResultData {
    stage,
    kind: "success".to_string(),
    completed,
    level: TraceLevel::Info,
    artifacts: vec![ArtifactRef::new(
      stage,
      ArtifactKind::Synthesis,
      None,
      format!("{}.json", stage),
    )],
    detail: String::new(),
  }
}

#[test]
fn append_assigns_increasing_seq_and_timestamps() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("trace.jsonl");
  let mut log = TraceLog::create(&path).unwrap();
  let graph = StageGraph::standard();
  let a = log
    .append(TraceEventKind::StateInit, &init(PipelineState::new(&graph), false))
    .unwrap();
  let b = log
    .append(TraceEventKind::StageResult, &stage_result(Stage::Parse, true))
    .unwrap();
  assert_eq!(a.seq, 1);
  assert_eq!(b.seq, 2);
  assert!(b.timestamp >= a.timestamp);

  let events = load_trace(&path).unwrap();
  assert_eq!(events, vec![a, b]);
}

#[test]
fn create_refuses_existing_trace() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("trace.jsonl");
  TraceLog::create(&path).unwrap();
  assert!(matches!(
    TraceLog::create(&path),
    Err(PipelineError::Io { .. })
  ));
}

#[test]
fn every_line_is_an_independent_record() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("trace.jsonl");
  let mut log = TraceLog::create(&path).unwrap();
  log
    .append(TraceEventKind::Decision, &serde_json::json!({"stage": "parse"}))
    .unwrap();
  log
    .append(TraceEventKind::Dispatch, &serde_json::json!({"stage": "parse"}))
    .unwrap();
  let text = std::fs::read_to_string(&path).unwrap();
  for line in text.lines() {
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert!(v.get("timestamp").is_some());
    assert!(v.get("event_type").is_some());
    assert!(v.get("data").is_some());
  }
}

#[test]
fn parse_skips_torn_final_line_only() {
  let good = r#"{"seq":1,"timestamp":"2026-02-14T10:00:00Z","event_type":"decision","data":{}}"#;
  let text = format!("{}\n{}", good, r#"{"seq":2,"timest"#);
  assert_eq!(parse_trace(&text).unwrap().len(), 1);

  let text = format!("{}\n{}\n", r#"{"seq":2,"timest"#, good);
  assert!(matches!(parse_trace(&text), Err(PipelineError::Trace(_))));
}

#[test]
fn open_append_continues_sequence_and_drops_torn_tail() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("trace.jsonl");
  {
    let mut log = TraceLog::create(&path).unwrap();
    log
      .append(TraceEventKind::Decision, &serde_json::json!({}))
      .unwrap();
    log
      .append(TraceEventKind::Dispatch, &serde_json::json!({}))
      .unwrap();
  }
  {
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(br#"{"seq":3,"tim"#).unwrap();
  }
  let mut log = TraceLog::open_append(&path).unwrap();
  let e = log
    .append(TraceEventKind::RunComplete, &serde_json::json!({}))
    .unwrap();
  assert_eq!(e.seq, 3);
  let events = load_trace(&path).unwrap();
  assert_eq!(
    events.iter().map(|e| e.seq).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );
}

#[test]
fn replay_rebuilds_completed_stages() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("trace.jsonl");
  let graph = StageGraph::standard();
  let mut log = TraceLog::create(&path).unwrap();
  log
    .append(TraceEventKind::StateInit, &init(PipelineState::new(&graph), false))
    .unwrap();
  log
    .append(TraceEventKind::StageResult, &stage_result(Stage::Parse, true))
    .unwrap();
  log
    .append(TraceEventKind::StageResult, &stage_result(Stage::Summarize, false))
    .unwrap();

  let state = replay_state(&load_trace(&path).unwrap(), &graph).unwrap();
  assert!(state.is_completed(Stage::Parse));
  assert!(!state.is_completed(Stage::Summarize));
  assert_eq!(state.artifacts(Stage::Parse)[0].path, "parse.json");
}

#[test]
fn replay_honours_resumed_state_init() {
  let graph = StageGraph::standard();
  let mut resumed = PipelineState::new(&graph);
  resumed.mark_completed(Stage::Parse, vec![], &graph).unwrap();
  let events = vec![
    event(1, TraceEventKind::StateInit, &init(PipelineState::new(&graph), false)),
    event(2, TraceEventKind::StageResult, &stage_result(Stage::Parse, true)),
    event(3, TraceEventKind::StateInit, &init(resumed.clone(), true)),
    event(4, TraceEventKind::StageResult, &stage_result(Stage::Summarize, true)),
  ];
  let state = replay_state(&events, &graph).unwrap();
  assert!(state.is_completed(Stage::Summarize));
  assert!(state.artifacts(Stage::Parse).is_empty());
}

#[test]
fn replay_without_state_init_fails() {
  let graph = StageGraph::standard();
  let events = vec![event(1, TraceEventKind::StageResult, &stage_result(Stage::Parse, true))];
  assert!(matches!(replay_state(&events, &graph), Err(PipelineError::Trace(_))));
  assert!(matches!(replay_state(&[], &graph), Err(PipelineError::Trace(_))));
}

#[test]
fn replay_rejects_out_of_order_completion() {
  let graph = StageGraph::standard();
  let events = vec![
    event(1, TraceEventKind::StateInit, &init(PipelineState::new(&graph), false)),
    event(2, TraceEventKind::StageResult, &stage_result(Stage::Survey, true)),
  ];
  assert!(matches!(
    replay_state(&events, &graph),
    Err(PipelineError::StateInconsistency(_))
  ));
}

fn event<T: serde::Serialize>(
  seq: u64,
  kind: TraceEventKind,
  data: &T,
) -> crate::types::TraceEvent {
  crate::types::TraceEvent {
    seq,
    timestamp: chrono::Utc::now(),
    event_type: kind,
    data: serde_json::to_value(data).unwrap(),
  }
}

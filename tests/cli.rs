//! Integration tests for the research_copilot binary.
//!
//! No test here needs a model server: runs either stop after `parse` or point
//! the execution endpoint at a closed port.

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::write_corpus;

fn copilot(args: &[&str]) -> Output {
  let mut cmd = Command::new(env!("CARGO_BIN_EXE_research_copilot"));
  cmd.args(args);
  for key in [
    "COPILOT_MODEL",
    "COPILOT_PLANNING_HOST",
    "COPILOT_EXECUTION_HOST",
    "COPILOT_OUTPUT_DIR",
  ] {
    cmd.env_remove(key);
  }
  cmd.env("RUST_LOG", "warn");
  cmd.output().expect("run research_copilot")
}

fn stdout(out: &Output) -> String {
  String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
  String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Config file pointing both endpoints at a port nothing listens on.
fn unreachable_config(dir: &Path) -> String {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let url = format!("http://{}", listener.local_addr().unwrap());
  drop(listener);
  let path = dir.join("config.json");
  let config = serde_json::json!({
    "planning_endpoint": url,
    "execution_endpoint": url,
    "request_timeout_secs": 2,
    "retry": { "max_retries": 0, "base_delay_ms": 0, "max_delay_ms": 0 },
  });
  std::fs::write(&path, config.to_string()).unwrap();
  path.to_string_lossy().into_owned()
}

/// The single `run_*` directory created under `out`.
fn run_dir(out: &Path) -> String {
  let mut dirs: Vec<_> = std::fs::read_dir(out)
    .unwrap()
    .map(|e| e.unwrap().path())
    .filter(|p| p.is_dir())
    .collect();
  assert_eq!(dirs.len(), 1, "{:?}", dirs);
  dirs.remove(0).to_string_lossy().into_owned()
}

#[test]
fn prints_usage_without_args() {
  let out = copilot(&[]);
  assert!(!out.status.success());
  let err = stderr(&out);
  assert!(err.contains("Usage"), "stderr: {}", err);
}

#[test]
fn rejects_unknown_stage_name() {
  let docs = tempfile::tempdir().unwrap();
  let out = copilot(&[
    "run",
    "--documents",
    docs.path().to_str().unwrap(),
    "--until",
    "review",
  ]);
  assert!(!out.status.success());
  assert!(stderr(&out).contains("review"));
}

#[test]
fn invalid_temperature_exits_1() {
  let docs = tempfile::tempdir().unwrap();
  let output = tempfile::tempdir().unwrap();
  let out = copilot(&[
    "run",
    "-d",
    docs.path().to_str().unwrap(),
    "-o",
    output.path().to_str().unwrap(),
    "--temperature",
    "3.5",
  ]);
  assert_eq!(out.status.code(), Some(1));
  assert!(stderr(&out).contains("temperature"), "stderr: {}", stderr(&out));
}

#[test]
fn status_of_non_run_directory_exits_1() {
  let dir = tempfile::tempdir().unwrap();
  let out = copilot(&["status", dir.path().to_str().unwrap()]);
  assert_eq!(out.status.code(), Some(1));
  assert!(stderr(&out).contains("Error"));
}

#[test]
fn run_until_parse_then_status_then_failed_resume() {
  let docs = tempfile::tempdir().unwrap();
  let output = tempfile::tempdir().unwrap();
  write_corpus(docs.path());
  let config = unreachable_config(output.path());

  let out = copilot(&[
    "run",
    "-d",
    docs.path().to_str().unwrap(),
    "-o",
    output.path().to_str().unwrap(),
    "--config",
    &config,
    "--until",
    "parse",
  ]);
  assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
  assert!(stdout(&out).contains("Pipeline stopped after parse."));

  let run = run_dir(output.path());
  let out = copilot(&["status", &run]);
  assert_eq!(out.status.code(), Some(0));
  let text = stdout(&out);
  assert!(text.contains("Next stage: summarize"), "stdout: {}", text);
  assert!(text.contains("Last run status: stopped"));

  // Every summary fails to connect, so the stage has no usable output.
  let out = copilot(&["resume", &run]);
  assert_eq!(out.status.code(), Some(1));
  let err = stderr(&out);
  assert!(err.contains("Pipeline aborted"), "stderr: {}", err);
  assert!(err.contains("Trace:"));
  assert!(Path::new(&run).join("trace.jsonl").is_file());
}

#[test]
fn compare_without_a_backend_reports_every_run_failed() {
  let docs = tempfile::tempdir().unwrap();
  let output = tempfile::tempdir().unwrap();
  write_corpus(docs.path());
  let config = unreachable_config(output.path());

  let out = copilot(&[
    "compare",
    "-d",
    docs.path().to_str().unwrap(),
    "-o",
    output.path().to_str().unwrap(),
    "--config",
    &config,
    "--params",
    "0.2,1",
  ]);
  assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
  let text = stdout(&out);
  assert!(text.contains("No successful runs to compare."), "stdout: {}", text);

  let comparison = run_dir(output.path());
  assert!(comparison.contains("comparison_"));
  let report: serde_json::Value = serde_json::from_slice(
    &std::fs::read(Path::new(&comparison).join("parameter_comparison_report.json")).unwrap(),
  )
  .unwrap();
  assert_eq!(report["results"][0]["outcome"]["status"], "error");
  assert!(report["recommended"].is_null());
}

#[test]
fn compare_rejects_malformed_parameter_pair() {
  let docs = tempfile::tempdir().unwrap();
  let out = copilot(&[
    "compare",
    "-d",
    docs.path().to_str().unwrap(),
    "--params",
    "0.2",
  ]);
  assert!(!out.status.success());
  assert!(stderr(&out).contains("TEMPERATURE,SEED"), "stderr: {}", stderr(&out));
}

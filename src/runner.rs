//! Run entry points: wire workspace, trace log, backend client and workers into
//! an [ExecutionLoop].
//!
//! - [run_pipeline]: fresh run in a new workspace.
//! - [resume_pipeline]: continue a stopped, aborted or cancelled run in place.
//! - [pipeline_status]: replay a run's trace without executing anything.
//! - [check_endpoints]: ask both endpoints which models they serve.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use crate::backend::{BackendClient, Endpoint, EndpointRole, GenerativeBackend, OllamaBackend};
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::pipeline::{
  ExecutionLoop, LoopEnv, LoopOptions, RunStatus, Selection, select_next_stage,
};
use crate::stages::StageWorkers;
use crate::state_io::save_state;
use crate::trace_log_io::{TraceLog, load_trace, replay_state};
use crate::types::{PipelineState, RunCompleteData, StageGraph, TraceEventKind};
use crate::workspace::{RunConfigSnapshot, RunWorkspace};

/// Options for [run_pipeline].
pub struct RunOptions<'a> {
  pub config: RunConfig,
  /// Directory the parser reads source documents from.
  pub document_dir: &'a Path,
  /// Parent directory for the new run workspace.
  pub output_dir: &'a Path,
  pub loop_options: LoopOptions,
}

/// Result of a run that completed or stopped on request.
#[derive(Debug)]
pub struct RunReport {
  pub run_id: String,
  pub run_dir: PathBuf,
  pub trace_path: PathBuf,
  pub status: RunStatus,
  pub state: PipelineState,
}

/// A run that ended in error. `trace_path` is the diagnostic source of truth;
/// it is `None` only when the run failed before its workspace existed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunAborted {
  #[source]
  pub error: PipelineError,
  pub state: PipelineState,
  pub trace_path: Option<PathBuf>,
}

impl RunAborted {
  fn before_trace(error: PipelineError, graph: &StageGraph) -> Self {
    Self {
      error,
      state: PipelineState::new(graph),
      trace_path: None,
    }
  }
}

/// Runs the standard pipeline over `options.document_dir` in a fresh workspace.
#[instrument(level = "trace", skip(options, transport, workers))]
pub async fn run_pipeline(
  options: RunOptions<'_>,
  transport: Arc<dyn GenerativeBackend>,
  workers: &StageWorkers,
) -> Result<RunReport, RunAborted> {
  let graph = StageGraph::standard();
  let RunOptions {
    config,
    document_dir,
    output_dir,
    loop_options,
  } = options;
  config
    .validate()
    .map_err(|e| RunAborted::before_trace(e, &graph))?;
  let workspace =
    RunWorkspace::create(output_dir).map_err(|e| RunAborted::before_trace(e, &graph))?;
  let snapshot = RunConfigSnapshot::new(config, Some(document_dir), Utc::now());
  let trace_path = workspace.trace_path();
  let state = PipelineState::new(&graph);
  let setup = || -> Result<TraceLog, PipelineError> {
    workspace.write_config(&snapshot)?;
    save_state(&workspace.state_path(), &state)?;
    TraceLog::create(&trace_path)
  };
  let trace = setup().map_err(|error| RunAborted {
    error,
    state: state.clone(),
    trace_path: Some(trace_path.clone()),
  })?;
  info!(run_id = %snapshot.run_id, run_dir = %workspace.root().display(), "starting run");

  execute(
    &graph,
    workers,
    &workspace,
    &snapshot,
    transport,
    trace,
    state,
    false,
    &loop_options,
  )
  .await
}

/// Continues the run in `run_dir` from the state its trace replays to, with the
/// configuration frozen in its `config.json`.
#[instrument(level = "trace", skip(loop_options, transport, workers))]
pub async fn resume_pipeline(
  run_dir: &Path,
  loop_options: LoopOptions,
  transport: Arc<dyn GenerativeBackend>,
  workers: &StageWorkers,
) -> Result<RunReport, RunAborted> {
  let graph = StageGraph::standard();
  let workspace = RunWorkspace::open(run_dir).map_err(|e| RunAborted::before_trace(e, &graph))?;
  let trace_path = workspace.trace_path();
  let aborted = |error: PipelineError| RunAborted {
    error,
    state: PipelineState::new(&graph),
    trace_path: Some(trace_path.clone()),
  };
  let snapshot = workspace.load_config().map_err(aborted)?;
  snapshot.config.validate().map_err(aborted)?;
  let events = load_trace(&trace_path).map_err(aborted)?;
  let state = replay_state(&events, &graph).map_err(aborted)?;
  let trace = TraceLog::open_append(&trace_path).map_err(aborted)?;
  info!(
    run_id = %snapshot.run_id,
    completed = ?state.completed_stages(),
    "resuming run"
  );

  execute(
    &graph,
    workers,
    &workspace,
    &snapshot,
    transport,
    trace,
    state,
    true,
    &loop_options,
  )
  .await
}

#[allow(clippy::too_many_arguments)]
async fn execute(
  graph: &StageGraph,
  workers: &StageWorkers,
  workspace: &RunWorkspace,
  snapshot: &RunConfigSnapshot,
  transport: Arc<dyn GenerativeBackend>,
  trace: TraceLog,
  state: PipelineState,
  resumed: bool,
  loop_options: &LoopOptions,
) -> Result<RunReport, RunAborted> {
  let config = &snapshot.config;
  let backend = BackendClient::for_execution(transport, config);
  let document_dir = snapshot.document_dir.as_deref().map(Path::new);
  let env = LoopEnv {
    graph,
    workers,
    config,
    workspace,
    backend: &backend,
    document_dir,
  };
  let trace_path = workspace.trace_path();
  match ExecutionLoop::new(env, trace, state, snapshot.run_id.clone())
    .run(resumed, loop_options)
    .await
  {
    Ok(outcome) => Ok(RunReport {
      run_id: snapshot.run_id.clone(),
      run_dir: workspace.root().to_path_buf(),
      trace_path,
      status: outcome.status,
      state: outcome.state,
    }),
    Err(abort) => Err(RunAborted {
      error: abort.error,
      state: abort.state,
      trace_path: Some(trace_path),
    }),
  }
}

/// Replayed view of a run directory.
#[derive(Debug)]
pub struct StatusReport {
  pub run_id: String,
  pub run_dir: PathBuf,
  pub state: PipelineState,
  /// Next stage the loop would run; `None` when complete or inconsistent.
  pub next: Option<Selection>,
  /// Status of the last `run_complete` record, if any.
  pub last_status: Option<String>,
  pub events: usize,
}

pub fn pipeline_status(run_dir: &Path) -> Result<StatusReport, PipelineError> {
  let graph = StageGraph::standard();
  let workspace = RunWorkspace::open(run_dir)?;
  let snapshot = workspace.load_config()?;
  let events = load_trace(&workspace.trace_path())?;
  let state = replay_state(&events, &graph)?;
  let last_status = events
    .iter()
    .rev()
    .find(|e| e.event_type == TraceEventKind::RunComplete)
    .and_then(|e| serde_json::from_value::<RunCompleteData>(e.data.clone()).ok())
    .map(|d| d.status);
  Ok(StatusReport {
    run_id: snapshot.run_id,
    run_dir: workspace.root().to_path_buf(),
    next: select_next_stage(&state, &graph).ok(),
    state,
    last_status,
    events: events.len(),
  })
}

/// Result of probing one endpoint.
#[derive(Debug)]
pub struct EndpointCheck {
  pub endpoint: Endpoint,
  /// Served model names, or why the endpoint could not be listed.
  pub models: Result<Vec<String>, String>,
  /// Whether the configured model (with or without a `:tag`) is served.
  pub model_available: bool,
}

pub async fn check_endpoints(config: &RunConfig, ollama: &OllamaBackend) -> Vec<EndpointCheck> {
  let mut checks = Vec::new();
  for role in [EndpointRole::Planning, EndpointRole::Execution] {
    let endpoint = Endpoint::from_config(config, role);
    let models = ollama
      .list_models(&endpoint)
      .await
      .map_err(|e| e.to_string());
    let model_available = models
      .as_ref()
      .is_ok_and(|names| names.iter().any(|n| model_matches(n, &config.model)));
    checks.push(EndpointCheck {
      endpoint,
      models,
      model_available,
    });
  }
  checks
}

/// `llama3.1` matches `llama3.1` and `llama3.1:latest`.
fn model_matches(served: &str, wanted: &str) -> bool {
  served == wanted || served.split_once(':').is_some_and(|(base, _)| base == wanted)
}

#[cfg(test)]
mod tests {
  use super::model_matches;

  #[test]
  fn model_names_match_with_or_without_tag() {
    assert!(model_matches("llama3.1", "llama3.1"));
    assert!(model_matches("llama3.1:latest", "llama3.1"));
    assert!(!model_matches("llama3", "llama3.1"));
    assert!(!model_matches("llama3.1:8b", "llama3.1:latest"));
  }
}

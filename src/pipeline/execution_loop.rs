//! Execution loop: select the next stage, dispatch its worker, record the result.
//!
//! The loop is the single owner of the [PipelineState] and the [TraceLog] for
//! a run. Stages run strictly one at a time.

use std::path::Path;

use tracing::{error, info, instrument, warn};

use super::cancel::CancelToken;
use super::select_stage::{Selection, select_next_stage};
use crate::backend::{BackendClient, ExchangeRecorder};
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::stages::{StageContext, StageInputs, StageWorkers};
use crate::state_io::save_state;
use crate::trace_log_io::TraceLog;
use crate::types::{
  BackendCallData, BackendExchange, BackendResponseData, DecisionData, DecisionOutcome,
  DispatchData, ErrorData, ExchangeOutcome, ItemError, PipelineState, ResultKind,
  RunCompleteData, Stage, StageGraph, StageResultData, StateInitData, TraceEventKind, TraceLevel,
  WorkerResult,
};
use crate::workspace::RunWorkspace;

/// How a loop invocation ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
  /// Every stage completed.
  Complete,
  /// Stopped on request after `after` completed.
  Stopped { after: Stage },
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Complete => "complete",
      RunStatus::Stopped { .. } => "stopped",
    }
  }
}

/// Per-invocation controls.
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
  /// Stop cleanly once this stage is completed.
  pub stop_after: Option<Stage>,
  pub cancel: CancelToken,
}

#[derive(Debug)]
pub struct LoopOutcome {
  pub status: RunStatus,
  pub state: PipelineState,
}

/// The error that aborted the loop and the state it left behind.
#[derive(Debug)]
pub struct LoopAbort {
  pub error: PipelineError,
  pub state: PipelineState,
}

/// Collaborators the loop hands to workers. All borrowed for the loop's lifetime.
pub struct LoopEnv<'a> {
  pub graph: &'a StageGraph,
  pub workers: &'a StageWorkers,
  pub config: &'a RunConfig,
  pub workspace: &'a RunWorkspace,
  pub backend: &'a BackendClient,
  pub document_dir: Option<&'a Path>,
}

pub struct ExecutionLoop<'a> {
  env: LoopEnv<'a>,
  trace: TraceLog,
  state: PipelineState,
  run_id: String,
  current: Option<Stage>,
}

impl<'a> ExecutionLoop<'a> {
  pub fn new(env: LoopEnv<'a>, trace: TraceLog, state: PipelineState, run_id: String) -> Self {
    Self {
      env,
      trace,
      state,
      run_id,
      current: None,
    }
  }

  /// Runs until the pipeline completes, stops, or aborts.
  ///
  /// Writes a `state_init` record first. On abort the failing step is followed
  /// by a fatal `error` record and a `run_complete` record; completed stages
  /// are never rewritten.
  #[instrument(level = "trace", skip(self, options), fields(run_id = %self.run_id))]
  pub async fn run(mut self, resumed: bool, options: &LoopOptions) -> Result<LoopOutcome, LoopAbort> {
    match self.drive(resumed, options).await {
      Ok(status) => Ok(LoopOutcome {
        status,
        state: self.state,
      }),
      Err(e) => {
        self.record_abort(&e);
        Err(LoopAbort {
          error: e,
          state: self.state,
        })
      }
    }
  }

  async fn drive(&mut self, resumed: bool, options: &LoopOptions) -> Result<RunStatus, PipelineError> {
    let init = StateInitData {
      run_id: self.run_id.clone(),
      resumed,
      state: self.state.clone(),
    };
    self.trace.append(TraceEventKind::StateInit, &init)?;

    loop {
      self.current = None;
      let selection = select_next_stage(&self.state, self.env.graph)?;

      if options.cancel.is_cancelled() && selection != Selection::Complete {
        let next = match selection {
          Selection::Next(stage) => Some(stage),
          Selection::Complete => None,
        };
        return Err(PipelineError::Cancelled { next });
      }

      let stage = match selection {
        Selection::Complete => {
          self.decision(None, DecisionOutcome::Complete)?;
          self.finish(RunStatus::Complete)?;
          info!(run_id = %self.run_id, "pipeline complete");
          return Ok(RunStatus::Complete);
        }
        Selection::Next(stage) => stage,
      };

      if let Some(after) = options.stop_after.filter(|s| self.state.is_completed(*s)) {
        self.decision(Some(stage), DecisionOutcome::Stopped)?;
        let status = RunStatus::Stopped { after };
        self.finish(status)?;
        info!(%after, next = %stage, "pipeline stopped on request");
        return Ok(status);
      }

      self.current = Some(stage);
      self.decision(Some(stage), DecisionOutcome::Dispatch)?;
      let result = self.dispatch(stage).await?;
      self.record_result(stage, result)?;
    }
  }

  /// Emits `dispatch` and runs the stage's worker on its upstream artifacts.
  /// If the worker fails, its backend exchanges are written before the error
  /// propagates.
  #[instrument(level = "trace", skip(self))]
  async fn dispatch(&mut self, stage: Stage) -> Result<WorkerResult, PipelineError> {
    let worker = self.env.workers.get(stage).cloned().ok_or_else(|| {
      PipelineError::StateInconsistency(format!("no worker registered for stage {}", stage))
    })?;
    let inputs: StageInputs = self
      .env
      .graph
      .upstream(stage)
      .into_iter()
      .map(|s| (s, self.state.artifacts(s).to_vec()))
      .collect();
    self.trace.append(
      TraceEventKind::Dispatch,
      &DispatchData {
        stage,
        worker: worker.name().to_string(),
        inputs: inputs.values().flatten().cloned().collect(),
      },
    )?;
    info!(%stage, worker = worker.name(), "dispatching stage");

    let recorder = ExchangeRecorder::default();
    let ctx = StageContext {
      config: self.env.config,
      workspace: self.env.workspace,
      inputs: &inputs,
      backend: self.env.backend,
      recorder: &recorder,
      document_dir: self.env.document_dir,
    };
    let outcome = worker.execute(&ctx).await;
    let exchanges = recorder.take();
    match outcome {
      Ok(mut result) => {
        result.exchanges.extend(exchanges);
        Ok(result)
      }
      Err(e) => {
        // Calls that completed before the worker failed still belong in the trace.
        self.record_exchanges(stage, exchanges)?;
        Err(e)
      }
    }
  }

  /// Writes the worker's exchanges and item errors, then applies the
  /// partial-failure policy and updates the state.
  fn record_result(&mut self, stage: Stage, result: WorkerResult) -> Result<(), PipelineError> {
    let WorkerResult {
      kind,
      artifacts,
      detail,
      exchanges,
      item_errors,
    } = result;

    self.record_exchanges(stage, exchanges)?;
    for item in &item_errors {
      self.record_item_error(stage, item)?;
    }

    let failure = match kind {
      ResultKind::Success => None,
      ResultKind::PartialFailure { usable }
        if usable && self.env.config.partial_failure.accepts(stage) =>
      {
        None
      }
      ResultKind::PartialFailure { .. } => Some(PipelineError::PartialFailure {
        stage,
        detail: detail.clone(),
      }),
      ResultKind::Failure => Some(PipelineError::StageFailed {
        stage,
        detail: detail.clone(),
      }),
    };

    if let Some(err) = failure {
      self.trace.append(
        TraceEventKind::StageResult,
        &StageResultData {
          stage,
          kind: kind.as_str().to_string(),
          completed: false,
          level: TraceLevel::Error,
          artifacts,
          detail,
        },
      )?;
      return Err(err);
    }

    let level = match kind {
      ResultKind::Success => TraceLevel::Info,
      _ => TraceLevel::Warning,
    };
    if level == TraceLevel::Warning {
      warn!(%stage, %detail, "stage completed with partial output");
    }
    self
      .state
      .mark_completed(stage, artifacts.clone(), self.env.graph)?;
    self.trace.append(
      TraceEventKind::StageResult,
      &StageResultData {
        stage,
        kind: kind.as_str().to_string(),
        completed: true,
        level,
        artifacts,
        detail: detail.clone(),
      },
    )?;
    save_state(&self.env.workspace.state_path(), &self.state)?;
    info!(%stage, %detail, "stage completed");
    Ok(())
  }

  /// Writes exchanges ordered by (source id, attempt) so the trace does not
  /// depend on completion order.
  fn record_exchanges(
    &mut self,
    stage: Stage,
    mut exchanges: Vec<BackendExchange>,
  ) -> Result<(), PipelineError> {
    exchanges.sort_by(|a, b| (&a.source_id, a.attempt).cmp(&(&b.source_id, b.attempt)));
    for exchange in &exchanges {
      self.record_exchange(stage, exchange)?;
    }
    Ok(())
  }

  fn record_exchange(&mut self, stage: Stage, exchange: &BackendExchange) -> Result<(), PipelineError> {
    self.trace.append(
      TraceEventKind::BackendCall,
      &BackendCallData {
        stage,
        source_id: exchange.source_id.clone(),
        endpoint: exchange.endpoint.clone(),
        attempt: exchange.attempt,
        sent_at: exchange.sent_at,
        prompt: exchange.prompt.clone(),
      },
    )?;
    match &exchange.outcome {
      ExchangeOutcome::Response { text } => {
        self.trace.append(
          TraceEventKind::BackendResponse,
          &BackendResponseData {
            stage,
            source_id: exchange.source_id.clone(),
            endpoint: exchange.endpoint.clone(),
            attempt: exchange.attempt,
            elapsed_ms: exchange.elapsed_ms,
            response: text.clone(),
          },
        )?;
      }
      ExchangeOutcome::Failure { message, transient } => {
        let error_kind = if *transient {
          "transport_error"
        } else {
          "backend_unavailable"
        };
        self.trace.append(
          TraceEventKind::Error,
          &ErrorData {
            stage: Some(stage),
            error_kind: error_kind.to_string(),
            source_id: exchange.source_id.clone(),
            endpoint: Some(exchange.endpoint.clone()),
            attempt: Some(exchange.attempt),
            message: message.clone(),
            fatal: false,
          },
        )?;
      }
    }
    Ok(())
  }

  fn record_item_error(&mut self, stage: Stage, item: &ItemError) -> Result<(), PipelineError> {
    self.trace.append(
      TraceEventKind::Error,
      &ErrorData {
        stage: Some(stage),
        error_kind: item.kind.as_str().to_string(),
        source_id: Some(item.source_id.clone()),
        endpoint: None,
        attempt: None,
        message: item.message.clone(),
        fatal: false,
      },
    )?;
    Ok(())
  }

  fn decision(&mut self, stage: Option<Stage>, outcome: DecisionOutcome) -> Result<(), PipelineError> {
    self.trace.append(
      TraceEventKind::Decision,
      &DecisionData {
        stage,
        outcome,
        state: self.state.clone(),
      },
    )?;
    Ok(())
  }

  fn finish(&mut self, status: RunStatus) -> Result<(), PipelineError> {
    save_state(&self.env.workspace.state_path(), &self.state)?;
    self.trace.append(
      TraceEventKind::RunComplete,
      &RunCompleteData {
        status: status.as_str().to_string(),
        completed_stages: self.state.completed_stages(),
      },
    )?;
    Ok(())
  }

  /// Best effort: the run is already failing, so write errors here are only logged.
  fn record_abort(&mut self, e: &PipelineError) {
    error!(error = %e, stage = ?self.current, "pipeline aborted");
    let stage = match e {
      PipelineError::Cancelled { next } => *next,
      _ => self.current,
    };
    let status = match e {
      PipelineError::Cancelled { .. } => "cancelled",
      _ => "aborted",
    };
    let error = ErrorData {
      stage,
      error_kind: e.kind().to_string(),
      source_id: None,
      endpoint: None,
      attempt: None,
      message: e.to_string(),
      fatal: true,
    };
    let complete = RunCompleteData {
      status: status.to_string(),
      completed_stages: self.state.completed_stages(),
    };
    let written = self
      .trace
      .append(TraceEventKind::Error, &error)
      .and_then(|_| self.trace.append(TraceEventKind::RunComplete, &complete))
      .and_then(|_| save_state(&self.env.workspace.state_path(), &self.state));
    if let Err(write_err) = written {
      warn!(error = %write_err, "could not record abort");
    }
  }
}

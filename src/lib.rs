//! # research-copilot
//!
//! Four-stage document-analysis pipeline (parse → summarize → synthesize →
//! survey) driven by an explicit state machine.
//!
//! ## Architecture
//!
//! - [pipeline]: pure next-stage selection and the execution loop that owns the
//!   [types::PipelineState] and the trace log.
//! - [stages]: one [stages::StageWorker] per stage; workers return a
//!   [types::WorkerResult] and never write state or trace directly.
//! - [backend]: generative backend transport ([backend::OllamaBackend]) and the
//!   retrying [backend::BackendClient].
//! - [trace_log_io], [state_io], [workspace]: everything a run writes to disk.
//! - [runner]: entry points used by the `research_copilot` binary.
//! - [compare]: the pipeline once per (temperature, seed) pair, scored and ranked.

pub mod backend;
pub mod compare;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod stages;
pub mod state_io;
pub mod trace_log_io;
#[cfg(test)]
mod trace_log_io_test;
pub mod types;
pub mod workspace;

pub use compare::{CompareOptions, ComparisonReport, ParameterSet, compare_parameters};
pub use config::RunConfig;
pub use error::{BackendError, PipelineError};
pub use pipeline::{CancelToken, LoopOptions, RunStatus};
pub use runner::{
  RunAborted, RunOptions, RunReport, check_endpoints, pipeline_status, resume_pipeline,
  run_pipeline,
};
pub use types::{PipelineState, Stage};

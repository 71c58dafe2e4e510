//! Stage workers: one per pipeline stage, all behind [StageWorker].
//!
//! Workers read predecessor artifacts and the run config, write their own
//! artifacts into the workspace and hand a [WorkerResult] back to the loop.
//! They never touch the pipeline state or the trace log. Backend calls go
//! through [StageContext::generate]; the loop attaches the recorded exchanges
//! to the result.

mod extractor;
mod parser;
pub mod prompts;
pub mod sections;
mod summarizer;
mod survey_writer;
mod synthesizer;
#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::backend::{BackendClient, ExchangeRecorder};
use crate::config::RunConfig;
use crate::error::{BackendError, PipelineError};
use crate::types::{ArtifactKind, ArtifactRef, ItemErrorKind, Stage, WorkerResult};
use crate::workspace::RunWorkspace;

pub use extractor::{DocumentExtractor, ExtractedDocument, TextDirectoryExtractor};
pub use parser::ParserWorker;
pub use summarizer::SummarizerWorker;
pub use survey_writer::SurveyWriterWorker;
pub use synthesizer::SynthesizerWorker;

/// Artifacts of every completed upstream stage, keyed by stage.
pub type StageInputs = BTreeMap<Stage, Vec<ArtifactRef>>;

/// Everything a worker is given for one execution.
pub struct StageContext<'a> {
  pub config: &'a RunConfig,
  pub workspace: &'a RunWorkspace,
  pub inputs: &'a StageInputs,
  pub backend: &'a BackendClient,
  /// Receives every backend exchange made through [StageContext::generate].
  pub recorder: &'a ExchangeRecorder,
  /// Source document directory (parser only).
  pub document_dir: Option<&'a Path>,
}

impl StageContext<'_> {
  /// Input artifacts of `kind` produced by `stage`, in recorded order.
  pub fn inputs_of(&self, stage: Stage, kind: ArtifactKind) -> Vec<&ArtifactRef> {
    self
      .inputs
      .get(&stage)
      .map(|refs| refs.iter().filter(|r| r.kind == kind).collect())
      .unwrap_or_default()
  }

  /// Calls the execution endpoint with the run's generation parameters and
  /// hands every attempt to the recorder before returning.
  pub async fn generate(
    &self,
    source_id: Option<&str>,
    prompt: &str,
  ) -> Result<String, BackendError> {
    let (result, exchanges) = self
      .backend
      .generate(source_id, prompt, &self.config.generation_params())
      .await
      .into_parts();
    self.recorder.record(exchanges);
    result
  }

  /// Reads every input artifact of `kind` from `stage`.
  pub fn read_inputs<T: DeserializeOwned>(
    &self,
    stage: Stage,
    kind: ArtifactKind,
  ) -> Result<Vec<T>, PipelineError> {
    self
      .inputs_of(stage, kind)
      .into_iter()
      .map(|r| self.workspace.read_json_artifact(r))
      .collect()
  }
}

/// Executes one stage.
///
/// `Ok` carries the stage outcome, including per-document failures the
/// worker absorbed. `Err` is reserved for failures of the worker itself
/// (unreadable inputs, workspace IO) and always aborts the run.
#[async_trait]
pub trait StageWorker: Send + Sync {
  fn stage(&self) -> Stage;

  fn name(&self) -> &str {
    self.stage().worker_name()
  }

  async fn execute(&self, ctx: &StageContext<'_>) -> Result<WorkerResult, PipelineError>;
}

/// Worker lookup by stage.
#[derive(Clone, Default)]
pub struct StageWorkers {
  workers: BTreeMap<Stage, Arc<dyn StageWorker>>,
}

impl StageWorkers {
  /// The four standard workers, with `extractor` feeding the parser.
  pub fn standard(extractor: Arc<dyn DocumentExtractor>) -> Self {
    Self::default()
      .with(Arc::new(ParserWorker::new(extractor)))
      .with(Arc::new(SummarizerWorker))
      .with(Arc::new(SynthesizerWorker))
      .with(Arc::new(SurveyWriterWorker))
  }

  /// Registers (or replaces) the worker for its stage.
  pub fn with(mut self, worker: Arc<dyn StageWorker>) -> Self {
    self.workers.insert(worker.stage(), worker);
    self
  }

  pub fn get(&self, stage: Stage) -> Option<&Arc<dyn StageWorker>> {
    self.workers.get(&stage)
  }
}

pub(crate) fn item_error_kind(e: &BackendError) -> ItemErrorKind {
  if e.is_transient() {
    ItemErrorKind::TransportError
  } else {
    ItemErrorKind::BackendUnavailable
  }
}

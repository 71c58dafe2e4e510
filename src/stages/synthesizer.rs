//! Synthesize stage: one generate call over all available summaries.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::prompts::synthesis_prompt;
use super::sections::synthesis_sections;
use super::{StageContext, StageWorker};
use crate::error::PipelineError;
use crate::types::{ArtifactKind, PaperSummary, Stage, Synthesis, WorkerResult};

/// Any backend failure here fails the stage.
pub struct SynthesizerWorker;

#[async_trait]
impl StageWorker for SynthesizerWorker {
  fn stage(&self) -> Stage {
    Stage::Synthesize
  }

  #[instrument(level = "trace", skip(self, ctx))]
  async fn execute(&self, ctx: &StageContext<'_>) -> Result<WorkerResult, PipelineError> {
    let mut summaries: Vec<PaperSummary> =
      ctx.read_inputs(Stage::Summarize, ArtifactKind::PaperSummary)?;
    if summaries.is_empty() {
      return Ok(WorkerResult::failure("no summaries available to synthesize"));
    }
    summaries.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    let prompt = synthesis_prompt(&summaries, ctx.config.synthesis_chars_per_summary);
    let insights = match ctx.generate(None, &prompt).await {
      Ok(text) => text,
      Err(e) => return Ok(WorkerResult::failure(format!("synthesis call failed: {}", e))),
    };

    let synthesis = Synthesis {
      num_papers: summaries.len(),
      papers: summaries.iter().map(|s| s.document_id.clone()).collect(),
      sections: synthesis_sections(&insights),
      insights,
    };
    let artifact =
      ctx
        .workspace
        .write_json_artifact(Stage::Synthesize, ArtifactKind::Synthesis, None, &synthesis)?;
    info!(papers = synthesis.num_papers, "synthesis written");
    Ok(WorkerResult::success(
      format!("synthesized {} summaries", synthesis.num_papers),
      vec![artifact],
    ))
  }
}

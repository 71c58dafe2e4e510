//! Survey stage: one generate call, then a references section built from the
//! document list.

use async_trait::async_trait;
use tracing::{info, instrument};

use super::prompts::{assemble_survey, references, survey_prompt};
use super::{StageContext, StageWorker};
use crate::error::PipelineError;
use crate::types::{ArtifactKind, PaperSummary, Stage, Survey, Synthesis, WorkerResult};

/// Writes the survey as text (`mini_survey_*.txt`) and as JSON with its metadata.
pub struct SurveyWriterWorker;

#[async_trait]
impl StageWorker for SurveyWriterWorker {
  fn stage(&self) -> Stage {
    Stage::Survey
  }

  #[instrument(level = "trace", skip(self, ctx))]
  async fn execute(&self, ctx: &StageContext<'_>) -> Result<WorkerResult, PipelineError> {
    let mut summaries: Vec<PaperSummary> =
      ctx.read_inputs(Stage::Summarize, ArtifactKind::PaperSummary)?;
    summaries.sort_by(|a, b| a.document_id.cmp(&b.document_id));
    let synthesis: Option<Synthesis> = ctx
      .read_inputs(Stage::Synthesize, ArtifactKind::Synthesis)?
      .into_iter()
      .next();
    let Some(synthesis) = synthesis else {
      return Ok(WorkerResult::failure("no synthesis artifact available"));
    };

    let refs = references(&summaries);
    let word_limit = ctx.config.survey_word_limit;
    let prompt = survey_prompt(
      &synthesis,
      &summaries,
      word_limit,
      ctx.config.survey_synthesis_chars,
    );
    let body = match ctx.generate(None, &prompt).await {
      Ok(text) => text,
      Err(e) => return Ok(WorkerResult::failure(format!("survey call failed: {}", e))),
    };

    let text = assemble_survey(&body, &refs);
    let survey = Survey {
      num_papers: summaries.len(),
      word_limit,
      papers: summaries.iter().map(|s| s.document_id.clone()).collect(),
      references: refs,
      text,
    };
    let text_ref =
      ctx
        .workspace
        .write_text_artifact(Stage::Survey, ArtifactKind::SurveyText, None, &survey.text)?;
    let json_ref =
      ctx
        .workspace
        .write_json_artifact(Stage::Survey, ArtifactKind::Survey, None, &survey)?;
    info!(papers = survey.num_papers, "survey written");
    Ok(WorkerResult::success(
      format!("wrote survey over {} papers", survey.num_papers),
      vec![text_ref, json_ref],
    ))
  }
}

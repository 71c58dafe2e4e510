//! Summarize stage: one generate call per parsed document.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, instrument, warn};

use super::prompts::summary_prompt;
use super::sections::summary_sections;
use super::{StageContext, StageWorker, item_error_kind};
use crate::error::PipelineError;
use crate::types::{ArtifactKind, ItemError, PaperSummary, ParsedDocument, Stage, WorkerResult};

/// Summarizes every parsed document, up to `summarizer_concurrency` calls in
/// flight. Results are handled in document-id order whatever the completion
/// order, so artifacts and exchanges come out the same on every run.
pub struct SummarizerWorker;

#[async_trait]
impl StageWorker for SummarizerWorker {
  fn stage(&self) -> Stage {
    Stage::Summarize
  }

  #[instrument(level = "trace", skip(self, ctx))]
  async fn execute(&self, ctx: &StageContext<'_>) -> Result<WorkerResult, PipelineError> {
    let mut documents: Vec<ParsedDocument> =
      ctx.read_inputs(Stage::Parse, ArtifactKind::ParsedDocument)?;
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    let attempted = documents.len();
    let max_chars = ctx.config.summary_input_chars;

    let mut outcomes: Vec<_> = futures::stream::iter(documents)
      .map(|doc| async move {
        let prompt = summary_prompt(&doc, max_chars);
        let result = ctx.generate(Some(&doc.id), &prompt).await;
        (doc, result)
      })
      .buffer_unordered(ctx.config.summarizer_concurrency.max(1))
      .collect()
      .await;
    outcomes.sort_by(|a, b| a.0.id.cmp(&b.0.id));

    let mut artifacts = Vec::new();
    let mut item_errors = Vec::new();
    for (doc, result) in outcomes {
      match result {
        Ok(text) => {
          let summary = PaperSummary {
            document_id: doc.id.clone(),
            filename: doc.filename,
            title: doc.title,
            sections: summary_sections(&text),
            summary: text,
          };
          artifacts.push(ctx.workspace.write_json_artifact(
            Stage::Summarize,
            ArtifactKind::PaperSummary,
            Some(&doc.id),
            &summary,
          )?);
        }
        Err(e) => {
          warn!(id = %doc.id, error = %e, "summary failed, document excluded");
          item_errors.push(ItemError::new(&doc.id, item_error_kind(&e), e.to_string()));
        }
      }
    }

    let succeeded = artifacts.len();
    info!(succeeded, attempted, "summarize stage finished");
    let detail = if attempted == 0 {
      "no parsed documents to summarize".to_string()
    } else {
      format!("summarized {} of {} documents", succeeded, attempted)
    };
    Ok(
      WorkerResult::from_counts(succeeded, attempted, detail, artifacts)
        .with_item_errors(item_errors),
    )
  }
}

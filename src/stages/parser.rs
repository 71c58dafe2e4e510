//! Parse stage: local extraction, no backend calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{DocumentExtractor, StageContext, StageWorker};
use crate::error::PipelineError;
use crate::types::{
  ArtifactKind, ItemError, ItemErrorKind, ParseFailureEntry, ParsedPaperEntry, ParsingSummary,
  Stage, WorkerResult,
};

/// Writes one `parsed_<id>` artifact per readable document plus a parsing summary.
///
/// Unreadable or empty documents are recorded as extraction errors and skipped.
/// The stage fails only when no document could be parsed.
pub struct ParserWorker {
  extractor: Arc<dyn DocumentExtractor>,
}

impl ParserWorker {
  pub fn new(extractor: Arc<dyn DocumentExtractor>) -> Self {
    Self { extractor }
  }
}

#[async_trait]
impl StageWorker for ParserWorker {
  fn stage(&self) -> Stage {
    Stage::Parse
  }

  #[instrument(level = "trace", skip(self, ctx))]
  async fn execute(&self, ctx: &StageContext<'_>) -> Result<WorkerResult, PipelineError> {
    let dir = ctx
      .document_dir
      .ok_or_else(|| PipelineError::Config("no document directory configured".to_string()))?;
    let mut documents = self.extractor.extract_all(dir)?;
    let limit = ctx.config.max_documents;
    let skipped: Vec<String> = if documents.len() > limit {
      documents.split_off(limit).into_iter().map(|d| d.id).collect()
    } else {
      vec![]
    };
    if !skipped.is_empty() {
      warn!(limit, skipped = skipped.len(), "document limit reached");
    }

    let attempted = documents.len();
    let mut artifacts = Vec::new();
    let mut papers = Vec::new();
    let mut failures = Vec::new();
    let mut item_errors = Vec::new();
    for doc in documents {
      match doc.result {
        Ok(parsed) => {
          artifacts.push(ctx.workspace.write_json_artifact(
            Stage::Parse,
            ArtifactKind::ParsedDocument,
            Some(&parsed.id),
            &parsed,
          )?);
          papers.push(ParsedPaperEntry {
            id: parsed.id.clone(),
            filename: parsed.filename.clone(),
            title: parsed.title.clone(),
            author: parsed.author.clone(),
            text_length: parsed.text.chars().count(),
          });
        }
        Err(reason) => {
          warn!(id = %doc.id, %reason, "document extraction failed");
          item_errors.push(ItemError::new(
            &doc.id,
            ItemErrorKind::ExtractionError,
            format!("{}: {}", doc.filename, reason),
          ));
          failures.push(ParseFailureEntry { id: doc.id, reason });
        }
      }
    }

    let succeeded = papers.len();
    let summary = ParsingSummary {
      document_dir: dir.display().to_string(),
      total_papers: succeeded,
      papers,
      failures,
      skipped: skipped.clone(),
    };
    artifacts.push(ctx.workspace.write_json_artifact(
      Stage::Parse,
      ArtifactKind::ParsingSummary,
      None,
      &summary,
    )?);

    let mut detail = if attempted == 0 {
      format!("no documents found in {}", dir.display())
    } else {
      format!("parsed {} of {} documents", succeeded, attempted)
    };
    if !skipped.is_empty() {
      detail.push_str(&format!(
        "; {} skipped over max_documents={}",
        skipped.len(),
        limit
      ));
    }
    info!(succeeded, attempted, "parse stage finished");
    Ok(WorkerResult::from_counts(succeeded, attempted, detail, artifacts).with_item_errors(item_errors))
  }
}

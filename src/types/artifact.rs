//! References to files a stage wrote into the run workspace.

use serde::{Deserialize, Serialize};

use super::Stage;

/// What an artifact file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
  ParsedDocument,
  ParsingSummary,
  PaperSummary,
  Synthesis,
  Survey,
  SurveyText,
}

impl ArtifactKind {
  /// File-name prefix used by the run workspace.
  pub fn file_prefix(&self) -> &'static str {
    match self {
      ArtifactKind::ParsedDocument => "parsed",
      ArtifactKind::ParsingSummary => "parsing_summary",
      ArtifactKind::PaperSummary => "summary",
      ArtifactKind::Synthesis => "synthesis",
      ArtifactKind::Survey | ArtifactKind::SurveyText => "mini_survey",
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      ArtifactKind::SurveyText => "txt",
      _ => "json",
    }
  }
}

/// Identifies one artifact file. `path` is relative to the run workspace root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub stage: Stage,
  pub kind: ArtifactKind,
  /// Source document id, for per-document artifacts.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_id: Option<String>,
  pub path: String,
}

impl ArtifactRef {
  pub fn new(
    stage: Stage,
    kind: ArtifactKind,
    source_id: Option<String>,
    path: impl Into<String>,
  ) -> Self {
    Self {
      stage,
      kind,
      source_id,
      path: path.into(),
    }
  }
}

//! Contents of the JSON artifacts each stage writes.

use serde::{Deserialize, Serialize};

/// Text and metadata extracted from one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
  /// Stable id derived from the file name.
  pub id: String,
  pub filename: String,
  pub title: String,
  pub author: String,
  pub text: String,
}

/// One line of the parsing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPaperEntry {
  pub id: String,
  pub filename: String,
  pub title: String,
  pub author: String,
  pub text_length: usize,
}

/// A document the parser could not use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailureEntry {
  pub id: String,
  pub reason: String,
}

/// Stage-level overview written by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingSummary {
  pub document_dir: String,
  pub total_papers: usize,
  pub papers: Vec<ParsedPaperEntry>,
  pub failures: Vec<ParseFailureEntry>,
  /// Documents dropped because of `max_documents`.
  #[serde(default)]
  pub skipped: Vec<String>,
}

/// Sections pulled out of a summary response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySections {
  pub main_contribution: String,
  pub methodology: String,
  pub key_findings: String,
  pub limitations: String,
  pub future_work: String,
}

/// Structured summary of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
  pub document_id: String,
  pub filename: String,
  pub title: String,
  /// Raw model response.
  pub summary: String,
  #[serde(flatten)]
  pub sections: SummarySections,
}

impl PaperSummary {
  /// Reference line used by the survey: `filename: title`.
  pub fn reference_label(&self) -> String {
    format!("{}: {}", self.filename, self.title)
  }
}

/// Sections pulled out of a synthesis response. Missing sections stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSections {
  pub common_themes: String,
  pub methodological_trends: String,
  pub research_gaps: String,
  pub contradictions: String,
}

/// Cross-paper synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
  pub num_papers: usize,
  /// Document ids the synthesis covers.
  pub papers: Vec<String>,
  /// Raw model response.
  pub insights: String,
  #[serde(flatten)]
  pub sections: SynthesisSections,
}

/// Final mini-survey with its deterministic references section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
  pub num_papers: usize,
  pub word_limit: usize,
  pub papers: Vec<String>,
  pub references: String,
  pub text: String,
}

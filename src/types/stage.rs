//! A stage of the fixed research pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One unit of the pipeline. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Parse,
  Summarize,
  Synthesize,
  Survey,
}

impl Stage {
  /// All stages in pipeline order.
  pub const ALL: [Stage; 4] = [
    Stage::Parse,
    Stage::Summarize,
    Stage::Synthesize,
    Stage::Survey,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Parse => "parse",
      Stage::Summarize => "summarize",
      Stage::Synthesize => "synthesize",
      Stage::Survey => "survey",
    }
  }

  /// Name of the worker that executes this stage (used in logs).
  pub fn worker_name(&self) -> &'static str {
    match self {
      Stage::Parse => "parser",
      Stage::Summarize => "summarizer",
      Stage::Synthesize => "synthesizer",
      Stage::Survey => "survey_writer",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Stage {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "parse" => Ok(Stage::Parse),
      "summarize" => Ok(Stage::Summarize),
      "synthesize" => Ok(Stage::Synthesize),
      "survey" => Ok(Stage::Survey),
      other => Err(format!(
        "unknown stage '{}' (expected parse, summarize, synthesize or survey)",
        other
      )),
    }
  }
}

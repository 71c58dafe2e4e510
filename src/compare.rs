//! Parameter comparison: the same documents through the pipeline once per
//! (temperature, seed) pair, each finished run scored on its survey.
//!
//! Runs land in a fresh `comparison_<timestamp>` directory next to the report
//! ([REPORT_FILENAME]). A failed run is reported with its error and does not
//! stop the comparison.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::backend::GenerativeBackend;
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::pipeline::{CancelToken, LoopOptions};
use crate::runner::{RunOptions, RunReport, run_pipeline};
use crate::stages::StageWorkers;
use crate::types::{ArtifactKind, PaperSummary, Stage, Survey};
use crate::workspace::{RunWorkspace, create_fresh_dir};

/// Report file name under the comparison directory.
pub const REPORT_FILENAME: &str = "parameter_comparison_report.json";

static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").expect("static regex"));

/// One generation setting to try.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
  pub temperature: f32,
  pub seed: u64,
}

impl ParameterSet {
  /// Used when no sets are given: three temperatures, one seed.
  pub fn defaults() -> Vec<Self> {
    [0.1, 0.3, 0.5]
      .into_iter()
      .map(|temperature| Self {
        temperature,
        seed: 42,
      })
      .collect()
  }
}

/// `TEMPERATURE,SEED`, e.g. `0.3,42`.
impl FromStr for ParameterSet {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (temperature, seed) = s
      .split_once(',')
      .ok_or_else(|| format!("expected TEMPERATURE,SEED, got '{}'", s))?;
    Ok(Self {
      temperature: temperature
        .trim()
        .parse()
        .map_err(|e| format!("invalid temperature '{}': {}", temperature, e))?,
      seed: seed
        .trim()
        .parse()
        .map_err(|e| format!("invalid seed '{}': {}", seed, e))?,
    })
  }
}

impl fmt::Display for ParameterSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "temperature {} seed {}", self.temperature, self.seed)
  }
}

/// Quality measures of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
  /// Whitespace-separated words in the survey, references included.
  pub word_count: usize,
  /// `[N]` markers in the survey, references included.
  pub citation_count: usize,
  /// Mean word count of the summaries' main contributions.
  pub avg_summary_length: f64,
  pub num_papers: usize,
}

impl RunMetrics {
  pub fn measure(survey_text: &str, summaries: &[PaperSummary]) -> Self {
    let avg_summary_length = if summaries.is_empty() {
      0.0
    } else {
      let words: usize = summaries
        .iter()
        .map(|s| s.sections.main_contribution.split_whitespace().count())
        .sum();
      words as f64 / summaries.len() as f64
    };
    Self {
      word_count: survey_text.split_whitespace().count(),
      citation_count: CITATION.find_iter(survey_text).count(),
      avg_summary_length,
      num_papers: summaries.len(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
  Success {
    run_dir: PathBuf,
    duration_secs: f64,
    metrics: RunMetrics,
  },
  Error {
    error: String,
    /// Workspace of the failed run, when one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_dir: Option<PathBuf>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
  pub params: ParameterSet,
  pub outcome: ComparisonOutcome,
}

impl ComparisonEntry {
  pub fn metrics(&self) -> Option<&RunMetrics> {
    match &self.outcome {
      ComparisonOutcome::Success { metrics, .. } => Some(metrics),
      ComparisonOutcome::Error { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
  pub comparison_dir: PathBuf,
  /// Survey length the recommendation aims for (the configured word limit).
  pub target_words: usize,
  /// One entry per attempted set, in the order given.
  pub results: Vec<ComparisonEntry>,
  /// `None` when no run succeeded.
  pub recommended: Option<ParameterSet>,
}

/// Best successful run: most citations, then word count closest to
/// `target_words`. Ties go to the earlier set.
pub fn recommend(results: &[ComparisonEntry], target_words: usize) -> Option<ParameterSet> {
  let mut best: Option<(ParameterSet, (usize, i64))> = None;
  for entry in results {
    let Some(m) = entry.metrics() else {
      continue;
    };
    let score = (
      m.citation_count,
      -(m.word_count.abs_diff(target_words) as i64),
    );
    if best.is_none_or(|(_, top)| score > top) {
      best = Some((entry.params, score));
    }
  }
  best.map(|(params, _)| params)
}

/// Options for [compare_parameters].
pub struct CompareOptions<'a> {
  /// Base configuration; temperature and seed are replaced per set.
  pub config: RunConfig,
  pub document_dir: &'a Path,
  /// Parent directory for the comparison directory.
  pub output_dir: &'a Path,
  pub parameter_sets: Vec<ParameterSet>,
  /// Checked between runs and inside each run.
  pub cancel: CancelToken,
}

/// Runs the pipeline once per parameter set and writes the report.
#[instrument(level = "trace", skip(options, transport, workers))]
pub async fn compare_parameters(
  options: CompareOptions<'_>,
  transport: Arc<dyn GenerativeBackend>,
  workers: &StageWorkers,
) -> Result<ComparisonReport, PipelineError> {
  let CompareOptions {
    config,
    document_dir,
    output_dir,
    parameter_sets,
    cancel,
  } = options;
  if parameter_sets.is_empty() {
    return Err(PipelineError::Config("no parameter sets to compare".to_string()));
  }
  let comparison_dir = create_fresh_dir(output_dir, "comparison")?;
  info!(
    dir = %comparison_dir.display(),
    runs = parameter_sets.len(),
    "starting parameter comparison"
  );

  let total = parameter_sets.len();
  let mut results = Vec::with_capacity(total);
  for (i, params) in parameter_sets.into_iter().enumerate() {
    if cancel.is_cancelled() {
      warn!(remaining = total - i, "comparison cancelled");
      break;
    }
    info!(run = i + 1, total, %params, "comparison run");
    let run_options = RunOptions {
      config: RunConfig {
        temperature: params.temperature,
        seed: params.seed,
        ..config.clone()
      },
      document_dir,
      output_dir: &comparison_dir,
      loop_options: LoopOptions {
        stop_after: None,
        cancel: cancel.clone(),
      },
    };
    let started = Instant::now();
    let outcome = match run_pipeline(run_options, transport.clone(), workers).await {
      Ok(report) => match measure(&report) {
        Ok(metrics) => ComparisonOutcome::Success {
          run_dir: report.run_dir,
          duration_secs: started.elapsed().as_secs_f64(),
          metrics,
        },
        Err(e) => ComparisonOutcome::Error {
          error: e.to_string(),
          run_dir: Some(report.run_dir),
        },
      },
      Err(abort) => {
        warn!(%params, error = %abort.error, "comparison run failed");
        ComparisonOutcome::Error {
          error: abort.error.to_string(),
          run_dir: abort
            .trace_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf),
        }
      }
    };
    results.push(ComparisonEntry { params, outcome });
  }

  let report = ComparisonReport {
    recommended: recommend(&results, config.survey_word_limit),
    target_words: config.survey_word_limit,
    comparison_dir,
    results,
  };
  let path = report.comparison_dir.join(REPORT_FILENAME);
  std::fs::write(&path, serde_json::to_vec_pretty(&report)?)
    .map_err(|e| PipelineError::io(&path, e))?;
  info!(recommended = ?report.recommended, report = %path.display(), "comparison finished");
  Ok(report)
}

/// Reads the survey and summaries of a completed run.
fn measure(report: &RunReport) -> Result<RunMetrics, PipelineError> {
  let workspace = RunWorkspace::open(&report.run_dir)?;
  let survey_ref = report
    .state
    .artifacts(Stage::Survey)
    .iter()
    .find(|a| a.kind == ArtifactKind::Survey)
    .ok_or_else(|| {
      PipelineError::StateInconsistency(format!(
        "run {} completed without a survey artifact",
        report.run_id
      ))
    })?;
  let survey: Survey = workspace.read_json_artifact(survey_ref)?;
  let summaries = report
    .state
    .artifacts(Stage::Summarize)
    .iter()
    .filter(|a| a.kind == ArtifactKind::PaperSummary)
    .map(|a| workspace.read_json_artifact(a))
    .collect::<Result<Vec<PaperSummary>, _>>()?;
  Ok(RunMetrics::measure(&survey.text, &summaries))
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::{ComparisonEntry, ComparisonOutcome, ParameterSet, RunMetrics, recommend};
  use crate::types::{PaperSummary, SummarySections};

  fn success(temperature: f32, word_count: usize, citation_count: usize) -> ComparisonEntry {
    ComparisonEntry {
      params: ParameterSet {
        temperature,
        seed: 42,
      },
      outcome: ComparisonOutcome::Success {
        run_dir: PathBuf::from("run"),
        duration_secs: 1.0,
        metrics: RunMetrics {
          word_count,
          citation_count,
          avg_summary_length: 0.0,
          num_papers: 3,
        },
      },
    }
  }

  #[test]
  fn parses_temperature_seed_pairs() {
    let p: ParameterSet = " 0.3, 7".parse().unwrap();
    assert_eq!(
      p,
      ParameterSet {
        temperature: 0.3,
        seed: 7
      }
    );
    assert!("0.3".parse::<ParameterSet>().is_err());
    assert!("hot,42".parse::<ParameterSet>().unwrap_err().contains("temperature"));
    assert!("0.3,-1".parse::<ParameterSet>().unwrap_err().contains("seed"));
  }

  #[test]
  fn metrics_count_words_citations_and_contribution_length() {
    let summary = |contribution: &str| PaperSummary {
      document_id: "d".to_string(),
      filename: "d.txt".to_string(),
      title: "T".to_string(),
      summary: String::new(),
      sections: SummarySections {
        main_contribution: contribution.to_string(),
        ..SummarySections::default()
      },
    };
    let m = RunMetrics::measure(
      "Attention [1] and recurrence [2][3].\n\n## References\n[1] a",
      &[summary("one two three"), summary("one")],
    );
    assert_eq!(m.word_count, 9);
    assert_eq!(m.citation_count, 4);
    assert_eq!(m.avg_summary_length, 2.0);
    assert_eq!(m.num_papers, 2);
    assert_eq!(RunMetrics::measure("", &[]).avg_summary_length, 0.0);
  }

  #[test]
  fn recommends_most_citations_then_closest_length() {
    let results = vec![
      success(0.1, 790, 5),
      success(0.3, 805, 7),
      success(0.5, 1200, 7),
      ComparisonEntry {
        params: ParameterSet {
          temperature: 0.9,
          seed: 42,
        },
        outcome: ComparisonOutcome::Error {
          error: "boom".to_string(),
          run_dir: None,
        },
      },
    ];
    assert_eq!(recommend(&results, 800).map(|p| p.temperature), Some(0.3));
    // Equal scores keep the earlier set.
    let tied = vec![success(0.1, 800, 2), success(0.2, 800, 2)];
    assert_eq!(recommend(&tied, 800).map(|p| p.temperature), Some(0.1));
    assert_eq!(recommend(&results[3..], 800), None);
  }
}

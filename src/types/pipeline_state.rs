//! Which stages are completed and what artifacts they produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ArtifactRef, Stage, StageGraph};
use crate::error::PipelineError;

/// Single source of truth consulted by the stage-selection step.
///
/// Flags move false → true once per stage and are never reset. The only
/// mutation is [PipelineState::mark_completed], called by the execution loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
  completed: BTreeMap<Stage, bool>,
  #[serde(default)]
  artifacts: BTreeMap<Stage, Vec<ArtifactRef>>,
}

impl PipelineState {
  /// Fresh state for a run: every stage of `graph` present and not completed.
  pub fn new(graph: &StageGraph) -> Self {
    Self {
      completed: graph.stages().map(|s| (s, false)).collect(),
      artifacts: BTreeMap::new(),
    }
  }

  /// Builds a state from raw flags, without any ordering checks. Used to restore
  /// snapshots; the selection step rejects inconsistent flag sets.
  pub fn from_flags(flags: impl IntoIterator<Item = (Stage, bool)>) -> Self {
    Self {
      completed: flags.into_iter().collect(),
      artifacts: BTreeMap::new(),
    }
  }

  pub fn is_completed(&self, stage: Stage) -> bool {
    self.completed.get(&stage).copied().unwrap_or(false)
  }

  /// True when the state tracks at least one stage and all of them are completed.
  pub fn all_completed(&self) -> bool {
    !self.completed.is_empty() && self.completed.values().all(|done| *done)
  }

  pub fn flags(&self) -> &BTreeMap<Stage, bool> {
    &self.completed
  }

  pub fn completed_stages(&self) -> Vec<Stage> {
    self
      .completed
      .iter()
      .filter(|(_, done)| **done)
      .map(|(s, _)| *s)
      .collect()
  }

  pub fn artifacts(&self, stage: Stage) -> &[ArtifactRef] {
    self
      .artifacts
      .get(&stage)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn all_artifacts(&self) -> &BTreeMap<Stage, Vec<ArtifactRef>> {
    &self.artifacts
  }

  /// Marks `stage` completed with the artifacts it produced.
  ///
  /// Fails with [PipelineError::StateInconsistency] if the stage is unknown,
  /// already completed, or any of its predecessors is not completed.
  #[instrument(level = "trace", skip(self, artifacts, graph))]
  pub fn mark_completed(
    &mut self,
    stage: Stage,
    artifacts: Vec<ArtifactRef>,
    graph: &StageGraph,
  ) -> Result<(), PipelineError> {
    let Some(done) = self.completed.get(&stage).copied() else {
      return Err(PipelineError::StateInconsistency(format!(
        "stage {} is not tracked by this pipeline state",
        stage
      )));
    };
    if done {
      return Err(PipelineError::StateInconsistency(format!(
        "stage {} is already completed",
        stage
      )));
    }
    if let Some(missing) = graph
      .predecessors(stage)
      .iter()
      .find(|p| !self.is_completed(**p))
    {
      return Err(PipelineError::StateInconsistency(format!(
        "stage {} cannot complete before its predecessor {}",
        stage, missing
      )));
    }
    self.completed.insert(stage, true);
    self.artifacts.insert(stage, artifacts);
    Ok(())
  }
}

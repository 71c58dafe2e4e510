//! Static stage graph: which stages exist and what each one waits for.

use std::collections::BTreeSet;

use serde::Serialize;

use super::Stage;

/// Immutable description of one stage: its name and required predecessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
  pub stage: Stage,
  /// Stages that must be completed before this one may be selected.
  pub predecessors: Vec<Stage>,
}

impl StageDescriptor {
  pub fn new(stage: Stage, predecessors: impl Into<Vec<Stage>>) -> Self {
    Self {
      stage,
      predecessors: predecessors.into(),
    }
  }
}

/// Ordered list of stage descriptors for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageGraph {
  descriptors: Vec<StageDescriptor>,
}

impl StageGraph {
  pub fn new(descriptors: Vec<StageDescriptor>) -> Self {
    Self { descriptors }
  }

  /// Parse → Summarize → Synthesize → Survey; each stage waits on the one before it.
  pub fn standard() -> Self {
    Self::new(vec![
      StageDescriptor::new(Stage::Parse, []),
      StageDescriptor::new(Stage::Summarize, [Stage::Parse]),
      StageDescriptor::new(Stage::Synthesize, [Stage::Summarize]),
      StageDescriptor::new(Stage::Survey, [Stage::Synthesize]),
    ])
  }

  pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
    self.descriptors.iter().map(|d| d.stage)
  }

  pub fn descriptor(&self, stage: Stage) -> Option<&StageDescriptor> {
    self.descriptors.iter().find(|d| d.stage == stage)
  }

  /// Direct predecessors of `stage` (empty for unknown stages).
  pub fn predecessors(&self, stage: Stage) -> &[Stage] {
    self
      .descriptor(stage)
      .map(|d| d.predecessors.as_slice())
      .unwrap_or(&[])
  }

  /// Every stage `stage` depends on, directly or not, in pipeline order.
  pub fn upstream(&self, stage: Stage) -> Vec<Stage> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<Stage> = self.predecessors(stage).to_vec();
    while let Some(next) = pending.pop() {
      if next != stage && seen.insert(next) {
        pending.extend_from_slice(self.predecessors(next));
      }
    }
    seen.into_iter().collect()
  }
}

impl Default for StageGraph {
  fn default() -> Self {
    Self::standard()
  }
}

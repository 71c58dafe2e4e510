//! Next-stage selection: a pure function of the pipeline state and stage graph.

use crate::error::PipelineError;
use crate::types::{PipelineState, Stage, StageGraph};

/// What the loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
  Next(Stage),
  Complete,
}

/// Stages not yet completed whose predecessors all are, in graph order.
pub fn eligible_stages(state: &PipelineState, graph: &StageGraph) -> Vec<Stage> {
  graph
    .stages()
    .filter(|s| !state.is_completed(*s))
    .filter(|s| graph.predecessors(*s).iter().all(|p| state.is_completed(*p)))
    .collect()
}

/// Picks the single eligible stage, or [Selection::Complete] when every stage
/// in `graph` is completed.
///
/// Fails with [PipelineError::StateInconsistency] when a completed stage has an
/// incomplete predecessor, when more than one stage is eligible, or when none
/// is eligible although the pipeline is incomplete.
pub fn select_next_stage(
  state: &PipelineState,
  graph: &StageGraph,
) -> Result<Selection, PipelineError> {
  for stage in graph.stages().filter(|s| state.is_completed(*s)) {
    if let Some(p) = graph
      .predecessors(stage)
      .iter()
      .find(|p| !state.is_completed(**p))
    {
      return Err(PipelineError::StateInconsistency(format!(
        "stage {} is completed but its predecessor {} is not",
        stage, p
      )));
    }
  }

  let eligible = eligible_stages(state, graph);
  match eligible.as_slice() {
    [stage] => Ok(Selection::Next(*stage)),
    [] if graph.stages().all(|s| state.is_completed(s)) => Ok(Selection::Complete),
    [] => Err(PipelineError::StateInconsistency(
      "no eligible stage although the pipeline is incomplete".to_string(),
    )),
    many => Err(PipelineError::StateInconsistency(format!(
      "{} stages eligible at once: {}",
      many.len(),
      many
        .iter()
        .map(Stage::as_str)
        .collect::<Vec<_>>()
        .join(", ")
    ))),
  }
}

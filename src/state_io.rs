//! Pipeline state snapshot save/load (`pipeline_state.json` under a run directory).

use std::path::Path;

use tracing::instrument;

use crate::error::PipelineError;
use crate::types::PipelineState;

/// Writes the snapshot to a temp file next to `path`, then renames it into place,
/// so readers never observe a half-written snapshot.
#[instrument(level = "trace", skip(path, state))]
pub fn save_state(path: &Path, state: &PipelineState) -> Result<(), PipelineError> {
  let json = serde_json::to_vec_pretty(state)?;
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
  }
  let tmp = path.with_extension("json.tmp");
  std::fs::write(&tmp, json).map_err(|e| PipelineError::io(&tmp, e))?;
  std::fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))
}

/// Loads a snapshot. Errors if the file is missing or not valid JSON.
#[instrument(level = "trace", skip(path))]
pub fn load_state(path: &Path) -> Result<PipelineState, PipelineError> {
  let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
  Ok(serde_json::from_slice(&bytes)?)
}

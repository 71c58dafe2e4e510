//! Run workspace: one fresh directory per run holding the config snapshot,
//! the trace log, the state snapshot and every stage artifact.
//!
//! Artifact files are written with create-new semantics; nothing inside a run
//! directory is ever overwritten except `pipeline_state.json`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::types::{ArtifactKind, ArtifactRef, Stage};

/// Run configuration file name under a run directory.
pub const CONFIG_FILENAME: &str = "config.json";
/// Trace file name under a run directory.
pub const TRACE_FILENAME: &str = "trace.jsonl";
/// Pipeline state snapshot file name under a run directory.
pub const STATE_FILENAME: &str = "pipeline_state.json";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const MAX_NAME_SUFFIX: u32 = 1000;

static UNSAFE_ID_CHARS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static regex"));

/// Maps an arbitrary source name onto `[A-Za-z0-9_-]`, never empty.
pub fn sanitize_id(raw: &str) -> String {
  let cleaned = UNSAFE_ID_CHARS.replace_all(raw.trim(), "_");
  let cleaned = cleaned.trim_matches('_');
  if cleaned.is_empty() {
    "document".to_string()
  } else {
    cleaned.to_string()
  }
}

/// Contents of `config.json`: written once at run start, read back on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigSnapshot {
  pub run_id: String,
  pub timestamp: String,
  /// Directory the parser reads source documents from.
  pub document_dir: Option<String>,
  #[serde(flatten)]
  pub config: RunConfig,
}

impl RunConfigSnapshot {
  pub fn new(config: RunConfig, document_dir: Option<&Path>, now: DateTime<Utc>) -> Self {
    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
      document_dir: document_dir.map(|d| d.display().to_string()),
      config,
    }
  }
}

/// Handle on one run directory.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
  root: PathBuf,
}

impl RunWorkspace {
  /// Creates `output_dir/run_<timestamp>` (with a `_N` suffix if taken).
  #[instrument(level = "trace", skip(output_dir))]
  pub fn create(output_dir: &Path) -> Result<Self, PipelineError> {
    let root = create_fresh_dir(output_dir, "run")?;
    debug!(run_dir = %root.display(), "created run workspace");
    Ok(Self { root })
  }

  /// Reopens an existing run directory (for resume and status).
  pub fn open(run_dir: &Path) -> Result<Self, PipelineError> {
    let config = run_dir.join(CONFIG_FILENAME);
    if !config.is_file() {
      return Err(PipelineError::Config(format!(
        "{} is not a run directory (missing {})",
        run_dir.display(),
        CONFIG_FILENAME
      )));
    }
    Ok(Self {
      root: run_dir.to_path_buf(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn trace_path(&self) -> PathBuf {
    self.root.join(TRACE_FILENAME)
  }

  pub fn state_path(&self) -> PathBuf {
    self.root.join(STATE_FILENAME)
  }

  pub fn config_path(&self) -> PathBuf {
    self.root.join(CONFIG_FILENAME)
  }

  /// Absolute path of an artifact.
  pub fn resolve(&self, artifact: &ArtifactRef) -> PathBuf {
    self.root.join(&artifact.path)
  }

  /// Writes `config.json`. Fails if it already exists.
  #[instrument(level = "trace", skip(self, snapshot))]
  pub fn write_config(&self, snapshot: &RunConfigSnapshot) -> Result<(), PipelineError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let path = self.config_path();
    write_new(&path, &json)
  }

  pub fn load_config(&self) -> Result<RunConfigSnapshot, PipelineError> {
    let path = self.config_path();
    let bytes = fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Serializes `value` as pretty JSON into a new artifact file.
  pub fn write_json_artifact<T: Serialize>(
    &self,
    stage: Stage,
    kind: ArtifactKind,
    source_id: Option<&str>,
    value: &T,
  ) -> Result<ArtifactRef, PipelineError> {
    let json = serde_json::to_vec_pretty(value)?;
    self.write_artifact(stage, kind, source_id, &json)
  }

  pub fn write_text_artifact(
    &self,
    stage: Stage,
    kind: ArtifactKind,
    source_id: Option<&str>,
    text: &str,
  ) -> Result<ArtifactRef, PipelineError> {
    self.write_artifact(stage, kind, source_id, text.as_bytes())
  }

  pub fn read_json_artifact<T: DeserializeOwned>(
    &self,
    artifact: &ArtifactRef,
  ) -> Result<T, PipelineError> {
    let path = self.resolve(artifact);
    let bytes = fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  pub fn read_text_artifact(&self, artifact: &ArtifactRef) -> Result<String, PipelineError> {
    let path = self.resolve(artifact);
    fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))
  }

  /// Names the file `<prefix>[_<source>]_<timestamp>.<ext>` and creates it.
  #[instrument(level = "trace", skip(self, bytes))]
  fn write_artifact(
    &self,
    stage: Stage,
    kind: ArtifactKind,
    source_id: Option<&str>,
    bytes: &[u8],
  ) -> Result<ArtifactRef, PipelineError> {
    let stamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let stem = match source_id {
      Some(id) => format!("{}_{}_{}", kind.file_prefix(), sanitize_id(id), stamp),
      None => format!("{}_{}", kind.file_prefix(), stamp),
    };
    for n in 0..MAX_NAME_SUFFIX {
      let name = if n == 0 {
        format!("{}.{}", stem, kind.extension())
      } else {
        format!("{}_{}.{}", stem, n, kind.extension())
      };
      let path = self.root.join(&name);
      match write_new(&path, bytes) {
        Ok(()) => {
          return Ok(ArtifactRef::new(
            stage,
            kind,
            source_id.map(String::from),
            name,
          ));
        }
        Err(PipelineError::Io { source, .. })
          if source.kind() == std::io::ErrorKind::AlreadyExists =>
        {
          continue;
        }
        Err(e) => return Err(e),
      }
    }
    Err(PipelineError::Config(format!(
      "could not allocate an artifact name for {}",
      stem
    )))
  }
}

/// Creates `parent/<prefix>_<timestamp>` (with a `_N` suffix if taken).
pub fn create_fresh_dir(parent: &Path, prefix: &str) -> Result<PathBuf, PipelineError> {
  fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
  let base = format!("{}_{}", prefix, Utc::now().format(TIMESTAMP_FORMAT));
  for n in 0..MAX_NAME_SUFFIX {
    let name = if n == 0 {
      base.clone()
    } else {
      format!("{}_{}", base, n)
    };
    let dir = parent.join(name);
    match fs::create_dir(&dir) {
      Ok(()) => return Ok(dir),
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
      Err(e) => return Err(PipelineError::io(&dir, e)),
    }
  }
  Err(PipelineError::Config(format!(
    "could not allocate a fresh {} directory under {}",
    prefix,
    parent.display()
  )))
}

/// Creates `path` and writes `bytes`; never truncates an existing file.
fn write_new(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
  let mut file = OpenOptions::new()
    .write(true)
    .create_new(true)
    .open(path)
    .map_err(|e| PipelineError::io(path, e))?;
  file.write_all(bytes).map_err(|e| PipelineError::io(path, e))?;
  file.sync_all().map_err(|e| PipelineError::io(path, e))
}

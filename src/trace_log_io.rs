//! Append-only trace log (trace.jsonl) and replay of pipeline state from it.
//!
//! The execution loop is the only writer. Every record is one JSON line, written
//! in a single `write_all` and flushed before `append` returns, so readers can
//! parse a trace while the run is still going.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::PipelineError;
use crate::types::{
  PipelineState, StageGraph, StageResultData, StateInitData, TraceEvent, TraceEventKind,
};

/// Writer half of the trace log.
#[derive(Debug)]
pub struct TraceLog {
  path: PathBuf,
  file: File,
  next_seq: u64,
  last_timestamp: Option<DateTime<Utc>>,
}

impl TraceLog {
  /// Creates a new trace file. Fails if one already exists at `path`.
  #[instrument(level = "trace", skip(path))]
  pub fn create(path: &Path) -> Result<Self, PipelineError> {
    let file = OpenOptions::new()
      .append(true)
      .create_new(true)
      .open(path)
      .map_err(|e| PipelineError::io(path, e))?;
    Ok(Self {
      path: path.to_path_buf(),
      file,
      next_seq: 1,
      last_timestamp: None,
    })
  }

  /// Reopens an existing trace for appending, continuing its sequence numbers.
  /// A torn final line (no trailing newline) is cut off first.
  #[instrument(level = "trace", skip(path))]
  pub fn open_append(path: &Path) -> Result<Self, PipelineError> {
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .open(path)
      .map_err(|e| PipelineError::io(path, e))?;
    let mut text = String::new();
    file
      .read_to_string(&mut text)
      .map_err(|e| PipelineError::io(path, e))?;
    if !text.is_empty() && !text.ends_with('\n') {
      let keep = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
      warn!(path = %path.display(), dropped_bytes = text.len() - keep, "dropping torn trace line");
      file
        .set_len(keep as u64)
        .map_err(|e| PipelineError::io(path, e))?;
      text.truncate(keep);
    }
    file
      .seek(SeekFrom::End(0))
      .map_err(|e| PipelineError::io(path, e))?;
    let events = parse_trace(&text)?;
    let last = events.last();
    Ok(Self {
      path: path.to_path_buf(),
      file,
      next_seq: last.map(|e| e.seq + 1).unwrap_or(1),
      last_timestamp: last.map(|e| e.timestamp),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Appends one record and returns it. Timestamps never go backwards.
  pub fn append<T: Serialize>(
    &mut self,
    event_type: TraceEventKind,
    data: &T,
  ) -> Result<TraceEvent, PipelineError> {
    let now = Utc::now();
    let timestamp = match self.last_timestamp {
      Some(last) if last > now => last,
      _ => now,
    };
    let event = TraceEvent {
      seq: self.next_seq,
      timestamp,
      event_type,
      data: serde_json::to_value(data)?,
    };
    let mut line = serde_json::to_vec(&event)?;
    line.push(b'\n');
    self
      .file
      .write_all(&line)
      .and_then(|_| self.file.flush())
      .map_err(|e| PipelineError::io(&self.path, e))?;
    self.next_seq += 1;
    self.last_timestamp = Some(timestamp);
    Ok(event)
  }
}

/// Reads and parses a trace file.
#[instrument(level = "trace", skip(path))]
pub fn load_trace(path: &Path) -> Result<Vec<TraceEvent>, PipelineError> {
  let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
  parse_trace(&text)
}

/// Parses JSONL trace text. A final line without a trailing newline that does
/// not parse is treated as an in-flight write and skipped; any other bad line
/// is an error.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEvent>, PipelineError> {
  let torn_tail = !text.is_empty() && !text.ends_with('\n');
  let lines: Vec<&str> = text.lines().collect();
  let mut events = Vec::with_capacity(lines.len());
  for (i, line) in lines.iter().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    match serde_json::from_str::<TraceEvent>(line) {
      Ok(event) => events.push(event),
      Err(_) if torn_tail && i + 1 == lines.len() => {
        warn!(line = i + 1, "skipping incomplete final trace line");
      }
      Err(e) => {
        return Err(PipelineError::Trace(format!(
          "line {} is not a valid trace record: {}",
          i + 1,
          e
        )));
      }
    }
  }
  Ok(events)
}

/// Rebuilds the pipeline state a trace describes.
///
/// Each `state_init` resets to its snapshot; each `stage_result` with
/// `completed = true` marks that stage completed with its artifacts. Replay
/// applies the same ordering checks as the live loop.
pub fn replay_state(
  events: &[TraceEvent],
  graph: &StageGraph,
) -> Result<PipelineState, PipelineError> {
  let mut state: Option<PipelineState> = None;
  for event in events {
    match event.event_type {
      TraceEventKind::StateInit => {
        let data: StateInitData = serde_json::from_value(event.data.clone())?;
        state = Some(data.state);
      }
      TraceEventKind::StageResult => {
        let data: StageResultData = serde_json::from_value(event.data.clone())?;
        if !data.completed {
          continue;
        }
        let current = state.as_mut().ok_or_else(|| {
          PipelineError::Trace(format!(
            "stage_result at seq {} precedes any state_init",
            event.seq
          ))
        })?;
        current.mark_completed(data.stage, data.artifacts, graph)?;
      }
      _ => {}
    }
  }
  state.ok_or_else(|| PipelineError::Trace("trace contains no state_init record".to_string()))
}

//! Document extraction: turns a directory of source files into parsed documents.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::PipelineError;
use crate::types::ParsedDocument;
use crate::workspace::sanitize_id;

/// One source document and what extraction made of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
  pub id: String,
  pub filename: String,
  /// Parsed content, or why the document could not be used.
  pub result: Result<ParsedDocument, String>,
}

/// Enumerates and reads source documents.
///
/// Failing for a single document is reported in [ExtractedDocument::result];
/// `Err` means the directory itself could not be read.
pub trait DocumentExtractor: Send + Sync {
  /// Extracted documents sorted by id.
  fn extract_all(&self, dir: &Path) -> Result<Vec<ExtractedDocument>, PipelineError>;
}

/// Reads `.txt` and `.md` files from a flat directory.
///
/// Title is the first non-empty line (leading `#` stripped); author comes from
/// an `Author:` or `Authors:` line when present.
#[derive(Debug, Clone, Default)]
pub struct TextDirectoryExtractor;

const EXTENSIONS: [&str; 2] = ["txt", "md"];
const UNKNOWN: &str = "Unknown";

impl TextDirectoryExtractor {
  fn source_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
      let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
      let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
      if path.is_file() && supported {
        files.push(path);
      }
    }
    files.sort();
    Ok(files)
  }

  fn read(path: &Path, id: &str, filename: &str) -> Result<ParsedDocument, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("unreadable: {}", e))?;
    let text = String::from_utf8(bytes).map_err(|_| "not valid UTF-8 text".to_string())?;
    if text.trim().is_empty() {
      return Err("no extractable text".to_string());
    }
    let (title, author) = metadata(&text);
    Ok(ParsedDocument {
      id: id.to_string(),
      filename: filename.to_string(),
      title,
      author,
      text,
    })
  }
}

impl DocumentExtractor for TextDirectoryExtractor {
  #[instrument(level = "trace", skip(self, dir))]
  fn extract_all(&self, dir: &Path) -> Result<Vec<ExtractedDocument>, PipelineError> {
    let mut seen = BTreeSet::new();
    let mut docs = Vec::new();
    for path in Self::source_files(dir)? {
      let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
      let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      let id = unique_id(&sanitize_id(&stem), &mut seen);
      let result = Self::read(&path, &id, &filename);
      debug!(%id, ok = result.is_ok(), "extracted document");
      docs.push(ExtractedDocument {
        id,
        filename,
        result,
      });
    }
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(docs)
  }
}

/// `base`, or `base_2`, `base_3`... if already taken.
fn unique_id(base: &str, seen: &mut BTreeSet<String>) -> String {
  let mut id = base.to_string();
  let mut n = 2;
  while !seen.insert(id.clone()) {
    id = format!("{}_{}", base, n);
    n += 1;
  }
  id
}

fn metadata(text: &str) -> (String, String) {
  let mut title = None;
  let mut author = None;
  for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if title.is_none() {
      let t = line.trim_start_matches('#').trim();
      if !t.is_empty() {
        title = Some(t.to_string());
        continue;
      }
    }
    if author.is_none() {
      let lower = line.to_ascii_lowercase();
      for prefix in ["authors:", "author:"] {
        if lower.starts_with(prefix) {
          author = Some(line[prefix.len()..].trim().to_string());
          break;
        }
      }
    }
    if title.is_some() && author.is_some() {
      break;
    }
  }
  (
    title.unwrap_or_else(|| UNKNOWN.to_string()),
    author
      .filter(|a| !a.is_empty())
      .unwrap_or_else(|| UNKNOWN.to_string()),
  )
}

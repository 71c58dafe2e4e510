//! Pulls numbered sections out of summary and synthesis responses.
//!
//! A section starts at its number (`2.`), its heading (`Methodology`) or both,
//! and runs until a blank line or the next section's start. The last section
//! runs to the end of the response.
//! Whitespace inside a section is collapsed to single spaces.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{SummarySections, SynthesisSections};

/// Summary sections shorter than this are treated as missing.
const MIN_SUMMARY_SECTION_CHARS: usize = 20;

struct SectionPattern {
  start: Regex,
  stop: Option<Regex>,
}

impl SectionPattern {
  fn new(number: &str, heading: &str, stop: Option<&str>) -> Self {
    let start = format!(r"(?i)(?:{number}[ \t]*\**(?:{heading})?|{heading})[:\-\s*]*");
    Self {
      start: Regex::new(&start).expect("static regex"),
      stop: stop.map(|s| Regex::new(&format!(r"(?i)\n\n|\n(?:{})", s)).expect("static regex")),
    }
  }

  fn capture(&self, response: &str) -> Option<String> {
    let start = self.start.find(response)?;
    let rest = &response[start.end()..];
    let end = self
      .stop
      .as_ref()
      .and_then(|stop| stop.find(rest))
      .map_or(rest.len(), |m| m.start());
    let content = WHITESPACE.replace_all(rest[..end].trim(), " ").into_owned();
    (!content.is_empty()).then_some(content)
  }
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static SENTENCE_END: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("static regex"));

static SUMMARY: LazyLock<[SectionPattern; 5]> = LazyLock::new(|| {
  [
    SectionPattern::new(r"1\.", "main contribution", Some(r"2\.|methodology")),
    SectionPattern::new(r"2\.", "methodology", Some(r"3\.|key")),
    SectionPattern::new(r"3\.", "key findings", Some(r"4\.|limitations")),
    SectionPattern::new(r"4\.", "limitations", Some(r"5\.|future")),
    SectionPattern::new(r"5\.", "future work", None),
  ]
});

static SYNTHESIS: LazyLock<[SectionPattern; 4]> = LazyLock::new(|| {
  [
    SectionPattern::new(r"1\.", "common themes?", Some(r"2\.")),
    SectionPattern::new(r"2\.", "methodological(?: trends?)?", Some(r"3\.")),
    SectionPattern::new(r"3\.", "research gaps?", Some(r"4\.")),
    SectionPattern::new(r"4\.", "contradictions?", None),
  ]
});

/// Sections of a summary response.
///
/// When no main contribution can be found the response is split into
/// sentences and spread over the sections by position instead.
pub fn summary_sections(response: &str) -> SummarySections {
  let [main_contribution, methodology, key_findings, limitations, future_work] =
    SUMMARY.each_ref().map(|p| {
      p.capture(response)
        .filter(|c| c.chars().count() > MIN_SUMMARY_SECTION_CHARS)
        .unwrap_or_default()
    });
  if main_contribution.is_empty() {
    return sentence_sections(response);
  }
  SummarySections {
    main_contribution,
    methodology,
    key_findings,
    limitations,
    future_work,
  }
}

/// Sections of a synthesis response; sections that are not found stay empty.
pub fn synthesis_sections(response: &str) -> SynthesisSections {
  let [common_themes, methodological_trends, research_gaps, contradictions] =
    SYNTHESIS.each_ref().map(|p| p.capture(response).unwrap_or_default());
  SynthesisSections {
    common_themes,
    methodological_trends,
    research_gaps,
    contradictions,
  }
}

/// Splits after `.`, `!` or `?` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut start = 0;
  for m in SENTENCE_END.find_iter(text) {
    out.push(&text[start..m.start() + 1]);
    start = m.end();
  }
  out.push(&text[start..]);
  out
}

/// Fifths of the response: the first one (at least two sentences) is the main
/// contribution; short responses leave the later sections as placeholders.
fn sentence_sections(response: &str) -> SummarySections {
  let sentences = sentences(response.trim());
  let n = sentences.len();
  let span = |from: usize, to: usize| sentences[from.min(n)..to.min(n)].join(" ");
  let section_or = |cond: bool, from: usize, to: usize, placeholder: &str| {
    if cond {
      span(from, to)
    } else {
      placeholder.to_string()
    }
  };
  SummarySections {
    main_contribution: span(0, (n / 5).max(2)),
    methodology: section_or(n > 5, n / 5, 2 * n / 5, "See main contribution"),
    key_findings: section_or(n > 5, 2 * n / 5, 3 * n / 5, "See main contribution"),
    limitations: section_or(n > 10, 3 * n / 5, 4 * n / 5, "Not stated"),
    future_work: section_or(n > 10, 4 * n / 5, n, "Not stated"),
  }
}

#[cfg(test)]
mod tests {
  use super::{sentences, summary_sections, synthesis_sections};

  const NUMBERED: &str = "Here is the summary.\n\n\
    1. Main Contribution: A sparse attention layer that scales linearly\n   with sequence length.\n\
    2. Methodology: Locality-sensitive hashing over query and key vectors.\n\
    3. Key Findings - Matches dense attention on long-document benchmarks.\n\
    4. Limitations: ok\n\
    5. Future Work: Extending the approach to cross-attention in decoders.";

  #[test]
  fn numbered_summary_sections_are_matched() {
    let s = summary_sections(NUMBERED);
    assert_eq!(
      s.main_contribution,
      "A sparse attention layer that scales linearly with sequence length."
    );
    assert_eq!(
      s.methodology,
      "Locality-sensitive hashing over query and key vectors."
    );
    assert_eq!(
      s.key_findings,
      "Matches dense attention on long-document benchmarks."
    );
    // Too short to count.
    assert_eq!(s.limitations, "");
    assert_eq!(
      s.future_work,
      "Extending the approach to cross-attention in decoders."
    );
  }

  #[test]
  fn headings_without_numbers_are_matched() {
    let text = "Main Contribution: a benchmark for multi-hop question answering\n\n\
      Methodology: crowd-sourced questions over linked encyclopedia pages";
    let s = summary_sections(text);
    assert_eq!(s.main_contribution, "a benchmark for multi-hop question answering");
    assert_eq!(
      s.methodology,
      "crowd-sourced questions over linked encyclopedia pages"
    );
  }

  #[test]
  fn unstructured_summary_falls_back_to_sentences() {
    let text = "One. Two! Three? Four. Five. Six. Seven.";
    let s = summary_sections(text);
    assert_eq!(s.main_contribution, "One. Two!");
    assert_eq!(s.methodology, "Two!");
    assert_eq!(s.key_findings, "Three? Four.");
    assert_eq!(s.limitations, "Not stated");
    assert_eq!(s.future_work, "Not stated");
  }

  #[test]
  fn short_unstructured_summary_keeps_everything_as_contribution() {
    let s = summary_sections("model: 812");
    assert_eq!(s.main_contribution, "model: 812");
    assert_eq!(s.methodology, "See main contribution");
  }

  #[test]
  fn sentence_split_keeps_punctuation() {
    assert_eq!(sentences("A b. C d?  E"), vec!["A b.", "C d?", "E"]);
    assert_eq!(sentences("no break"), vec!["no break"]);
  }

  #[test]
  fn synthesis_sections_are_matched_and_missing_ones_stay_empty() {
    let text = "1. Common Themes: efficiency of attention\n\
      2. Methodological Trends: pretraining then fine-tuning\n\
      3. Research Gaps: low-resource languages";
    let s = synthesis_sections(text);
    assert_eq!(s.common_themes, "efficiency of attention");
    assert_eq!(s.methodological_trends, "pretraining then fine-tuning");
    assert_eq!(s.research_gaps, "low-resource languages");
    assert_eq!(s.contradictions, "");
  }
}

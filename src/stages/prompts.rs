//! Prompt builders for the generative stages.
//!
//! Callers own truncation: builders take their character limits from
//! [crate::config::RunConfig] and cut on `char` boundaries. Only the survey's
//! per-paper contribution quote has a fixed length.

use crate::types::{PaperSummary, ParsedDocument, Synthesis};

/// Characters of each main contribution quoted in the survey prompt.
const SURVEY_CONTRIBUTION_CHARS: usize = 200;

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((idx, _)) => &text[..idx],
    None => text,
  }
}

pub fn summary_prompt(doc: &ParsedDocument, max_chars: usize) -> String {
  format!(
    "You are a research paper analyzer. Analyze the following research paper and provide a structured summary.\n\n\
     Paper Title: {title}\n\n\
     Paper Text:\n{text}\n\n\
     Provide:\n\
     1. Main Contribution - Primary research contribution\n\
     2. Methodology - Methods/approaches used\n\
     3. Key Findings - Main results\n\
     4. Limitations - Limitations or challenges\n\
     5. Future Work - Future directions suggested\n\n\
     Be specific and extract from the paper.",
    title = doc.title,
    text = truncate_chars(&doc.text, max_chars),
  )
}

/// One block per paper built from its contribution, methodology and findings.
/// `chars_per_summary` bounds each block's body.
pub fn synthesis_prompt(summaries: &[PaperSummary], chars_per_summary: usize) -> String {
  let combined = summaries
    .iter()
    .enumerate()
    .map(|(i, s)| {
      let body = format!(
        "Contribution: {}\nMethodology: {}\nFindings: {}",
        or_na(&s.sections.main_contribution),
        or_na(&s.sections.methodology),
        or_na(&s.sections.key_findings),
      );
      format!(
        "=== Paper {}: {} ({}) ===\n{}",
        i + 1,
        s.filename,
        s.title,
        truncate_chars(&body, chars_per_summary)
      )
    })
    .collect::<Vec<_>>()
    .join("\n\n");
  format!(
    "You are a research analyst. Analyze these {count} papers and synthesize:\n\n\
     {combined}\n\n\
     Provide:\n\
     1. Common Themes - Themes across papers\n\
     2. Methodological Trends - Methodological patterns\n\
     3. Research Gaps - Unexplored areas\n\
     4. Contradictions - Conflicting findings",
    count = summaries.len(),
  )
}

/// The survey prompt lists every paper with the start of its main contribution
/// under the citation number the references section will give it.
pub fn survey_prompt(
  synthesis: &Synthesis,
  summaries: &[PaperSummary],
  word_limit: usize,
  synthesis_chars: usize,
) -> String {
  let papers = summaries
    .iter()
    .enumerate()
    .map(|(i, s)| {
      format!(
        "[{}] {}\n    {}",
        i + 1,
        s.title,
        truncate_chars(or_na(&s.sections.main_contribution), SURVEY_CONTRIBUTION_CHARS)
      )
    })
    .collect::<Vec<_>>()
    .join("\n");
  format!(
    "You are a technical writer creating a mini-survey paper. Write a comprehensive survey \
     (maximum {word_limit} words) based on the following research papers.\n\n\
     Common themes: {themes}\n\n\
     Synthesis:\n{insights}\n\n\
     Individual Papers:\n{papers}\n\n\
     Requirements:\n\
     1. Start with an introduction to the topic\n\
     2. Discuss key themes and methodologies\n\
     3. Present main findings across papers\n\
     4. Identify research gaps\n\
     5. Conclude with future directions\n\
     6. Use inline citations like [1], [2], etc. when referencing papers\n\
     7. Keep it under {word_limit} words\n\
     8. Write in academic style\n\n\
     Write the mini-survey now:",
    themes = or_na(&synthesis.sections.common_themes),
    insights = truncate_chars(&synthesis.insights, synthesis_chars),
  )
}

fn or_na(section: &str) -> &str {
  if section.is_empty() {
    "N/A"
  } else {
    section
  }
}

/// `[i] filename: title` per summary, 1-based, in the given order.
///
/// Depends only on the document list, never on model output.
pub fn references(summaries: &[PaperSummary]) -> String {
  summaries
    .iter()
    .enumerate()
    .map(|(i, s)| format!("[{}] {}", i + 1, s.reference_label()))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Model text with the references section appended.
pub fn assemble_survey(model_text: &str, references: &str) -> String {
  format!("{}\n\n## References\n{}\n", model_text.trim_end(), references)
}

#[cfg(test)]
mod tests {
  use super::{assemble_survey, references, survey_prompt, synthesis_prompt, truncate_chars};
  use crate::types::{PaperSummary, SummarySections, Synthesis, SynthesisSections};

  fn summary(id: &str, title: &str) -> PaperSummary {
    PaperSummary {
      document_id: id.to_string(),
      filename: format!("{}.txt", id),
      title: title.to_string(),
      summary: "s".to_string(),
      sections: Default::default(),
    }
  }

  #[test]
  fn truncate_respects_char_boundaries() {
    assert_eq!(truncate_chars("héllo", 2), "hé");
    assert_eq!(truncate_chars("abc", 10), "abc");
    assert_eq!(truncate_chars("abc", 0), "");
  }

  #[test]
  fn references_are_numbered_in_order() {
    let refs = references(&[summary("a", "Alpha"), summary("b", "Beta")]);
    assert_eq!(refs, "[1] a.txt: Alpha\n[2] b.txt: Beta");
  }

  #[test]
  fn survey_gets_references_section() {
    let text = assemble_survey("Body text.\n\n", "[1] a.txt: Alpha");
    assert_eq!(text, "Body text.\n\n## References\n[1] a.txt: Alpha\n");
  }

  #[test]
  fn synthesis_prompt_uses_summary_sections() {
    let mut a = summary("a", "Alpha");
    a.sections = SummarySections {
      main_contribution: "A new tokenizer".to_string(),
      methodology: "Byte-pair merges".to_string(),
      key_findings: "Smaller vocabularies".to_string(),
      ..SummarySections::default()
    };
    let prompt = synthesis_prompt(&[a, summary("b", "Beta")], 1000);
    assert!(prompt.contains("Analyze these 2 papers"));
    assert!(prompt.contains(
      "=== Paper 1: a.txt (Alpha) ===\nContribution: A new tokenizer\n\
       Methodology: Byte-pair merges\nFindings: Smaller vocabularies"
    ));
    assert!(prompt.contains("=== Paper 2: b.txt (Beta) ===\nContribution: N/A"));

    let short = synthesis_prompt(&[summary("c", "Gamma")], 18);
    assert!(short.contains("===\nContribution: N/A\n\n"));
  }

  #[test]
  fn survey_prompt_quotes_contributions_and_themes() {
    let mut a = summary("a", "Alpha");
    a.sections.main_contribution = "x".repeat(300);
    let synthesis = Synthesis {
      num_papers: 1,
      papers: vec!["a".to_string()],
      insights: "raw insights".to_string(),
      sections: SynthesisSections {
        common_themes: "scaling".to_string(),
        ..SynthesisSections::default()
      },
    };
    let prompt = survey_prompt(&synthesis, &[a], 500, 100);
    assert!(prompt.contains("maximum 500 words"));
    assert!(prompt.contains("Common themes: scaling"));
    assert!(prompt.contains(&format!("[1] Alpha\n    {}\n", "x".repeat(200))));
    assert!(!prompt.contains(&"x".repeat(201)));
  }
}

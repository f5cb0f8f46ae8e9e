//! Answer and source rendering

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::store::ScoredRecord;

/// A chunk cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub document: String,
    pub score: f32,
    /// Leading characters of the chunk
    pub excerpt: String,
    pub chunk_id: String,
    pub ordinal: usize,
}

impl Source {
    pub fn from_record(record: &ScoredRecord, preview_chars: usize) -> Self {
        Self {
            document: record.metadata.source.clone(),
            score: record.score,
            excerpt: record.metadata.text.chars().take(preview_chars).collect(),
            chunk_id: record.id.clone(),
            ordinal: record.metadata.ordinal,
        }
    }
}

/// Sources for the records that made it into the prompt, rank order kept.
pub fn sources_for(records: &[ScoredRecord], preview_chars: usize) -> Vec<Source> {
    records
        .iter()
        .map(|record| Source::from_record(record, preview_chars))
        .collect()
}

/// Human-readable answer followed by its numbered sources.
pub fn render_answer(text: &str, sources: &[Source]) -> String {
    let mut out = text.trim().to_string();
    if sources.is_empty() {
        return out;
    }

    out.push_str("\n\nSources:");
    for (i, source) in sources.iter().enumerate() {
        let _ = write!(
            out,
            "\n  [Source {}] {} (relevance {:.2})\n      {}",
            i + 1,
            source.document,
            source.score,
            one_line(&source.excerpt)
        );
    }
    out
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordMetadata;

    fn hit(text: &str) -> ScoredRecord {
        ScoredRecord {
            id: "doc_Criminal Code_3".to_string(),
            score: 0.8312,
            metadata: RecordMetadata {
                source: "Criminal Code".to_string(),
                text: text.to_string(),
                ordinal: 3,
                char_start: 0,
                char_end: text.chars().count(),
            },
        }
    }

    #[test]
    fn excerpt_is_prefix_of_chunk() {
        let source = Source::from_record(&hit(&"ሀ".repeat(300)), 200);
        assert_eq!(source.excerpt.chars().count(), 200);
        assert_eq!(source.document, "Criminal Code");
        assert_eq!(source.ordinal, 3);
        assert_eq!(source.chunk_id, "doc_Criminal Code_3");
    }

    #[test]
    fn short_chunk_is_excerpted_whole() {
        let source = Source::from_record(&hit("Theft is punishable."), 200);
        assert_eq!(source.excerpt, "Theft is punishable.");
    }

    #[test]
    fn render_lists_numbered_sources() {
        let sources = sources_for(&[hit("Theft is\npunishable.")], 200);
        let rendered = render_answer("Imprisonment [Source 1].\n", &sources);

        assert!(rendered.starts_with("Imprisonment [Source 1].\n\nSources:"));
        assert!(rendered.contains("[Source 1] Criminal Code (relevance 0.83)"));
        assert!(rendered.contains("Theft is punishable."));
    }

    #[test]
    fn render_without_sources_is_just_the_text() {
        assert_eq!(render_answer(" General information. ", &[]), "General information.");
    }
}

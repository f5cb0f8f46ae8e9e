//! Prompt assembly for the answer generator

use crate::config::QuerySettings;
use crate::integrations::openai::ChatMessage;
use crate::prompts::{render_system_prompt, Prompt};
use crate::store::ScoredRecord;

/// Context text used when retrieval returned nothing usable.
pub const NO_CONTEXT: &str = "No relevant documents were found for this question.";

/// Messages for one completion request, plus the chunks they cite.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub messages: Vec<ChatMessage>,
    /// Retrieved records placed in the context, in rank order
    pub included: Vec<ScoredRecord>,
    /// Characters of labeled context
    pub context_chars: usize,
}

impl BuiltPrompt {
    /// Records that were retrieved but left out to respect the context limit.
    pub fn dropped(&self, retrieved: usize) -> usize {
        retrieved.saturating_sub(self.included.len())
    }
}

/// Builds the chat request from the system template, retrieved chunks,
/// prior conversation and the question.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
    max_context_chars: usize,
    conversation_limit: usize,
}

impl PromptBuilder {
    pub fn new(
        template: impl Into<String>,
        max_context_chars: usize,
        conversation_limit: usize,
    ) -> Self {
        Self {
            template: template.into(),
            max_context_chars,
            conversation_limit,
        }
    }

    /// Builder using `prompts/system.md` or the built-in instruction.
    pub fn from_settings(settings: &QuerySettings) -> Self {
        Self::new(
            Prompt::System.load_or_builtin(),
            settings.max_context_chars,
            settings.conversation_context_limit,
        )
    }

    pub fn build(
        &self,
        question: &str,
        retrieved: &[ScoredRecord],
        history: &[ChatMessage],
    ) -> BuiltPrompt {
        let mut lines: Vec<String> = Vec::new();
        let mut context_chars = 0;

        // Keep the best-ranked prefix that fits; a chunk is never cut.
        for (position, record) in retrieved.iter().enumerate() {
            let line = source_line(position + 1, record);
            let separator = if lines.is_empty() { 0 } else { 1 };
            let cost = separator + line.chars().count();
            if context_chars + cost > self.max_context_chars {
                break;
            }
            context_chars += cost;
            lines.push(line);
        }

        let included: Vec<ScoredRecord> = retrieved[..lines.len()].to_vec();
        let context = if lines.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            lines.join("\n")
        };

        let mut messages = Vec::with_capacity(history.len().min(self.conversation_limit) + 2);
        messages.push(ChatMessage::system(render_system_prompt(&self.template, &context)));

        let prior: Vec<&ChatMessage> = history.iter().filter(|m| m.role != "system").collect();
        let skip = prior.len().saturating_sub(self.conversation_limit);
        messages.extend(prior.into_iter().skip(skip).cloned());

        messages.push(ChatMessage::user(question.trim()));

        BuiltPrompt {
            messages,
            included,
            context_chars,
        }
    }
}

/// `Source N [document]: text`
pub fn source_line(number: usize, record: &ScoredRecord) -> String {
    format!(
        "Source {} [{}]: {}",
        number, record.metadata.source, record.metadata.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordMetadata;

    fn hit(source: &str, text: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            id: format!("doc_{}_0", source),
            score,
            metadata: RecordMetadata {
                source: source.to_string(),
                text: text.to_string(),
                ordinal: 0,
                char_start: 0,
                char_end: text.chars().count(),
            },
        }
    }

    fn builder(max_context_chars: usize) -> PromptBuilder {
        PromptBuilder::new("Context:\n{context}", max_context_chars, 6)
    }

    #[test]
    fn keeps_everything_under_the_limit() {
        let retrieved = vec![
            hit("Criminal Code", "Theft is punishable by imprisonment.", 0.9),
            hit("Constitution", "Every person has the right to life.", 0.4),
        ];
        let prompt = builder(12_000).build("What is the penalty for theft?", &retrieved, &[]);

        assert_eq!(prompt.included, retrieved);
        assert_eq!(prompt.messages.len(), 2);
        let system = prompt.messages[0].text();
        assert!(system.contains("Source 1 [Criminal Code]: Theft is punishable by imprisonment."));
        assert!(system.contains("Source 2 [Constitution]: Every person has the right to life."));
        assert_eq!(prompt.messages[1].text(), "What is the penalty for theft?");
    }

    #[test]
    fn drops_lowest_ranked_chunks_first() {
        let retrieved = vec![
            hit("a", &"x".repeat(40), 0.9),
            hit("b", &"y".repeat(40), 0.8),
            hit("c", &"z".repeat(40), 0.7),
        ];
        let first = source_line(1, &retrieved[0]).chars().count();
        let second = source_line(2, &retrieved[1]).chars().count();

        // Room for two lines plus the separator, not three.
        let prompt = builder(first + 1 + second).build("q?", &retrieved, &[]);

        assert_eq!(prompt.included.len(), 2);
        assert_eq!(prompt.included[0].metadata.source, "a");
        assert_eq!(prompt.included[1].metadata.source, "b");
        assert_eq!(prompt.context_chars, first + 1 + second);
        assert_eq!(prompt.dropped(retrieved.len()), 1);
        assert!(prompt.messages[0].text().contains(&"y".repeat(40)));
        assert!(!prompt.messages[0].text().contains('z'));
    }

    #[test]
    fn never_truncates_a_retained_chunk() {
        let retrieved = vec![hit("a", "short", 0.9), hit("b", &"long ".repeat(50), 0.8)];
        let prompt = builder(100).build("q?", &retrieved, &[]);

        assert_eq!(prompt.included.len(), 1);
        assert!(!prompt.messages[0].text().contains("long"));
    }

    #[test]
    fn oversized_top_chunk_leaves_no_context() {
        let retrieved = vec![hit("a", &"x".repeat(200), 0.9)];
        let prompt = builder(50).build("q?", &retrieved, &[]);

        assert!(prompt.included.is_empty());
        assert!(prompt.messages[0].text().contains(NO_CONTEXT));
    }

    #[test]
    fn empty_retrieval_uses_placeholder_context() {
        let prompt = builder(1000).build("q?", &[], &[]);
        assert!(prompt.included.is_empty());
        assert_eq!(prompt.context_chars, 0);
        assert!(prompt.messages[0].text().contains(NO_CONTEXT));
    }

    #[test]
    fn replays_only_recent_conversation() {
        let history: Vec<ChatMessage> = (0..5)
            .flat_map(|i| {
                vec![
                    ChatMessage::user(format!("question {}", i)),
                    ChatMessage::assistant(format!("answer {}", i)),
                ]
            })
            .collect();

        let prompt = builder(1000).build("next?", &[], &history);

        // system + last 6 + question
        assert_eq!(prompt.messages.len(), 8);
        assert_eq!(prompt.messages[1].text(), "question 2");
        assert_eq!(prompt.messages[6].text(), "answer 4");
        assert_eq!(prompt.messages[7].text(), "next?");
    }

    #[test]
    fn prior_system_messages_are_not_replayed() {
        let history = vec![ChatMessage::system("old"), ChatMessage::user("hi")];
        let prompt = builder(1000).build("q?", &[], &history);

        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages[1].text(), "hi");
    }
}

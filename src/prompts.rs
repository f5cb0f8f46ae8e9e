//! System prompt loading.
//!
//! Prompts live in the `prompts/` directory at the project root. A missing
//! file falls back to the built-in text so the query pipeline always has an
//! instruction to send.

use std::path::PathBuf;

use crate::{Error, Result};

/// Placeholder replaced by the labeled source context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

const DEFAULT_SYSTEM_PROMPT: &str = "You are LawChat, a helpful legal research assistant for \
Ethiopian law. You have access to the following relevant legal documents:

{context}

Please use this context to answer the user's questions about legal matters.
When you reference specific information from these sources, cite the source as [Source X].
If the information is not in the provided context, acknowledge that and provide general legal \
information, but make it clear that this is general information and not specific legal advice.
Always maintain a professional, helpful tone and format your responses clearly.";

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Assistant role, citation rules and the context slot.
    System,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::System => "system.md",
        }
    }

    /// Text used when no prompt file is present.
    pub fn builtin(&self) -> &'static str {
        match self {
            Prompt::System => DEFAULT_SYSTEM_PROMPT,
        }
    }

    /// Load the prompt from its file.
    pub fn load(&self) -> Result<String> {
        load_prompt(self.filename())
    }

    /// Load the prompt file, or the built-in text when it is missing or blank.
    pub fn load_or_builtin(&self) -> String {
        match self.load() {
            Ok(text) if !text.trim().is_empty() => text,
            _ => self.builtin().to_string(),
        }
    }
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::ConfigurationError(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Path to the prompts directory.
pub fn prompts_dir() -> PathBuf {
    let candidates = [PathBuf::from("prompts"), PathBuf::from("../prompts")];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// Insert the context into a prompt template.
///
/// Templates without the placeholder get the context appended.
pub fn render_system_prompt(template: &str, context: &str) -> String {
    if template.contains(CONTEXT_PLACEHOLDER) {
        template.replace(CONTEXT_PLACEHOLDER, context)
    } else {
        format!("{}\n\n{}", template.trim_end(), context)
    }
}

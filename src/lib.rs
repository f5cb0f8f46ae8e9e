//! LawChat: question answering over Ethiopian legal documents
//!
//! This library provides tools to:
//! - Load PDF and text legal documents and split them into citable chunks
//! - Embed chunks and store them in a vector index (Qdrant or a local file)
//! - Answer questions with retrieval-augmented generation and numbered sources
//! - Keep conversation state for interactive chat sessions

pub mod config;
pub mod documents;
pub mod error;
pub mod integrations;
pub mod metrics;
pub mod prompts;
pub mod rag;
pub mod session;
pub mod store;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use integrations::{ChatMessage, OpenAIClient};
pub use prompts::{load_prompt, Prompt};
pub use rag::{
    Answer, IngestReport, Ingestor, QueryFailure, QueryPipeline, QueryRequest, QueryStage, Source,
};
pub use session::ChatSession;

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;

//! Retrieval-augmented answering over the indexed legal corpus.
//!
//! - `ingest` turns document files into indexed chunk records
//! - `prompt` assembles the grounded chat prompt from retrieved chunks
//! - `pipeline` runs a question through embed → retrieve → prompt → generate
//! - `format` renders answers with their numbered sources

pub mod format;
pub mod ingest;
pub mod pipeline;
pub mod prompt;

pub use format::{render_answer, Source};
pub use ingest::{FailedDocument, IngestReport, IngestedDocument, Ingestor};
pub use pipeline::{
    validate_question, Answer, QueryFailure, QueryPipeline, QueryRequest, QueryStage, QueryState,
};
pub use prompt::{BuiltPrompt, PromptBuilder};

//! External integrations module.
//!
//! Provides the OpenAI-compatible chat completion client used to
//! generate answers. Embeddings live in `store::embeddings`.

pub mod openai;

pub use openai::{ChatMessage, OpenAIClient};

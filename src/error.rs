//! Error types for the LawChat pipelines

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read document {path}: {reason}")]
    DocumentReadError { path: String, reason: String },

    #[error("Embedding service error: {0}")]
    EmbeddingServiceError(String),

    #[error("Vector index error: {0}")]
    IndexServiceError(String),

    #[error("Generation service error: {0}")]
    GenerationServiceError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid question: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn document_read(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DocumentReadError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::EmbeddingServiceError(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::IndexServiceError(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::EmbeddingServiceError(err.to_string())
    }
}

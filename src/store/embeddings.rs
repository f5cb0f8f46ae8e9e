//! Embedding generation for chunks and questions

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use backoff::ExponentialBackoffBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::models::normalize;
use crate::config::{validate_openai_key, EmbedderBackend, OpenAiSettings};
use crate::error::{Error, Result};

/// Provider limit on inputs per embeddings request.
const MAX_INPUTS_PER_REQUEST: usize = 2048;

/// Model name reported by the local embedder.
pub const LOCAL_MODEL: &str = "local-hash";

/// Embedding backend. Chunks and questions must go through the same one.
pub enum Embedder {
    OpenAi(OpenAiEmbedder),
    Local(LocalEmbedder),
}

impl Embedder {
    /// Build the backend selected in the settings.
    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self> {
        match settings.embedder {
            EmbedderBackend::OpenAi => Ok(Self::OpenAi(OpenAiEmbedder::new(settings)?)),
            EmbedderBackend::Local => Ok(Self::Local(LocalEmbedder::new(
                settings.embedding_dimension,
            ))),
        }
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingServiceError("No embedding returned".to_string()))
    }

    /// Embed several texts, one vector per input in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(Error::EmbeddingServiceError(format!(
                "cannot embed empty text (input {})",
                position
            )));
        }

        let vectors = match self {
            Self::OpenAi(embedder) => embedder.embed_batch(texts).await?,
            Self::Local(embedder) => texts.iter().map(|t| embedder.embed(t)).collect(),
        };

        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingServiceError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::EmbeddingServiceError(format!(
                "embedding has dimension {}, expected {}",
                bad.len(),
                dimension
            )));
        }

        Ok(vectors)
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::OpenAi(embedder) => embedder.dimension,
            Self::Local(embedder) => embedder.dim,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(embedder) => &embedder.model,
            Self::Local(_) => LOCAL_MODEL,
        }
    }
}

/// Embeddings from an OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        validate_openai_key(&settings.api_key, &settings.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::EmbeddingServiceError(e.to_string()))?;

        let config = OpenAIConfig::new()
            .with_api_key(settings.api_key.trim())
            .with_api_base(settings.base_url.trim_end_matches('/'));
        // Provider-side retries stop once the request timeout has elapsed.
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(settings.timeout_secs)))
            .build();
        let client = OpenAIClient::with_config(config)
            .with_http_client(http)
            .with_backoff(backoff);

        Ok(Self {
            client,
            model: settings.embedding_model.clone(),
            dimension: settings.embedding_dimension,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut result = Vec::with_capacity(texts.len());

        for group in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            debug!("Generating embeddings for {} texts", group.len());

            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(group.to_vec()))
                .build()?;

            let response = self.client.embeddings().create(request).await?;

            info!(
                "Generated {} embeddings, tokens used: {}",
                response.data.len(),
                response.usage.total_tokens
            );

            let mut data = response.data;
            data.sort_by_key(|e| e.index);
            result.extend(data.into_iter().map(|e| e.embedding));
        }

        Ok(result)
    }

    /// Check the key with a one-word embedding request.
    pub async fn verify(&self) -> Result<()> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String("test".to_string()))
            .build()?;
        self.client.embeddings().create(request).await?;
        Ok(())
    }
}

/// Deterministic hashed bag-of-words embedder.
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in tokens(text) {
            vec[bucket(&token, self.dim)] += 1.0;
        }
        normalize(&mut vec);
        vec
    }
}

/// Token slot from the leading SHA-256 bytes. Stored local indexes depend on
/// this mapping staying fixed.
fn bucket(token: &str, dim: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(head) % dim as u64) as usize
}

/// Lowercased alphanumeric tokens; punctuation never sticks to a word.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

//! Configuration for the ingestion and query pipelines
//!
//! Loads configuration from config.yml, then applies environment overrides.
//! Every pipeline stage receives the settings struct it needs explicitly.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const EMBEDDING_DIMENSION: usize = 1536;
pub const CHAT_MODEL: &str = "gpt-4o";
pub const QDRANT_URL: &str = "http://localhost:6334";
pub const COLLECTION_NAME: &str = "ethiopian-law";
pub const DOCS_DIR: &str = "docs";
pub const TRACKING_FILE: &str = "processed_files.json";
pub const LOCAL_INDEX_FILE: &str = "local_index.json";
pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
/// Smallest chunk that can never be whitespace only after normalization
pub const MIN_CHUNK_SIZE: usize = 16;
pub const BATCH_SIZE: usize = 50;
pub const TOP_K: usize = 5;
pub const MAX_CONTEXT_LENGTH: usize = 12_000;
pub const CONVERSATION_CONTEXT_LIMIT: usize = 6;
pub const CHAT_HISTORY_LIMIT: usize = 10;
pub const MIN_QUERY_LENGTH: usize = 3;
pub const MAX_QUERY_LENGTH: usize = 500;
pub const CACHE_TTL_SECS: u64 = 300;
pub const CACHE_CAPACITY: usize = 10;
pub const SOURCE_PREVIEW_LENGTH: usize = 200;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// Hosted OpenAI-compatible embeddings endpoint
    OpenAi,
    /// Deterministic hashed bag-of-words (offline runs and tests)
    Local,
}

impl EmbedderBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Which vector index to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    /// JSON file on disk, searched in memory
    Local,
}

impl IndexBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "qdrant" => Some(Self::Qdrant),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Hosted model settings shared by the embedder and the answer generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub embedder: EmbedderBackend,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENAI_API_URL.to_string(),
            embedder: EmbedderBackend::OpenAi,
            embedding_model: EMBEDDING_MODEL.to_string(),
            embedding_dimension: EMBEDDING_DIMENSION,
            chat_model: CHAT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Collection (index namespace) holding the chunk records
    pub collection: String,
    pub local_path: PathBuf,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Qdrant,
            qdrant_url: QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection: COLLECTION_NAME.to_string(),
            local_path: PathBuf::from(LOCAL_INDEX_FILE),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub docs_dir: PathBuf,
    pub tracking_file: PathBuf,
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
    /// Chunks per embedding/upsert request
    pub batch_size: usize,
    pub max_batch_attempts: usize,
    pub retry_backoff_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from(DOCS_DIR),
            tracking_file: PathBuf::from(TRACKING_FILE),
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
            batch_size: BATCH_SIZE,
            max_batch_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub top_k: usize,
    /// Upper bound on the labeled context placed in the prompt, in characters
    pub max_context_chars: usize,
    /// Prior chat messages replayed to the model
    pub conversation_context_limit: usize,
    pub history_limit: usize,
    pub min_query_chars: usize,
    pub max_query_chars: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub source_preview_chars: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: TOP_K,
            max_context_chars: MAX_CONTEXT_LENGTH,
            conversation_context_limit: CONVERSATION_CONTEXT_LIMIT,
            history_limit: CHAT_HISTORY_LIMIT,
            min_query_chars: MIN_QUERY_LENGTH,
            max_query_chars: MAX_QUERY_LENGTH,
            cache_ttl_secs: CACHE_TTL_SECS,
            cache_capacity: CACHE_CAPACITY,
            source_preview_chars: SOURCE_PREVIEW_LENGTH,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiSettings,
    pub index: IndexSettings,
    pub ingest: IngestSettings,
    pub query: QuerySettings,
}

impl Config {
    /// Load configuration from config.yml or use defaults.
    /// Environment variables take precedence over config.yml values.
    pub fn new() -> Self {
        Self::load_dotenv();

        let config = Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(Path::new("..").join(CONFIG_FILE)))
            .unwrap_or_default();

        config.with_env_overrides()
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file (no environment overrides).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse YAML configuration, resolving `${VAR}` references.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: Config = serde_yaml::from_str(content)?;

        config.openai.api_key = Self::resolve_env_string(&config.openai.api_key);
        config.openai.base_url = Self::resolve_env_string(&config.openai.base_url);
        config.index.qdrant_url = Self::resolve_env_string(&config.index.qdrant_url);
        config.index.qdrant_api_key = config
            .index
            .qdrant_api_key
            .as_deref()
            .map(Self::resolve_env_string)
            .filter(|key| !key.is_empty());

        Ok(config)
    }

    /// Resolve a value that looks like `${VAR}` from the environment.
    fn resolve_env_string(value: &str) -> String {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            return std::env::var(var_name).unwrap_or_default();
        }
        value.to_string()
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_non_empty("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(url) = env_non_empty("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(backend) =
            env_non_empty("LAWCHAT_EMBEDDER").and_then(|v| EmbedderBackend::parse(&v))
        {
            self.openai.embedder = backend;
        }
        if let Some(url) = env_non_empty("QDRANT_URL") {
            self.index.qdrant_url = url;
        }
        if let Some(key) = env_non_empty("QDRANT_API_KEY") {
            self.index.qdrant_api_key = Some(key);
        }
        if let Some(collection) = env_non_empty("LAWCHAT_COLLECTION") {
            self.index.collection = collection;
        }
        if let Some(backend) =
            env_non_empty("LAWCHAT_INDEX_BACKEND").and_then(|v| IndexBackend::parse(&v))
        {
            self.index.backend = backend;
        }
        if let Some(dir) = env_non_empty("LAWCHAT_DOCS_DIR") {
            self.ingest.docs_dir = PathBuf::from(dir);
        }
        self
    }

    /// Check structural settings. Runs before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.openai.embedding_model.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "embedding model name is empty".to_string(),
            ));
        }
        if self.openai.chat_model.trim().is_empty() {
            return Err(Error::ConfigurationError("chat model name is empty".to_string()));
        }
        if self.openai.embedding_dimension == 0 {
            return Err(Error::ConfigurationError(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.ingest.chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::ConfigurationError(format!(
                "chunk size must be at least {} characters",
                MIN_CHUNK_SIZE
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(Error::ConfigurationError(
                "batch size must be positive".to_string(),
            ));
        }
        if self.query.top_k == 0 {
            return Err(Error::ConfigurationError("top_k must be positive".to_string()));
        }
        if self.query.max_context_chars == 0 {
            return Err(Error::ConfigurationError(
                "max context length must be positive".to_string(),
            ));
        }
        if self.index.backend == IndexBackend::Qdrant && self.index.collection.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "index collection name is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the OpenAI API key the hosted services need.
    pub fn validate_api_key(&self) -> Result<()> {
        validate_openai_key(&self.openai.api_key, &self.openai.base_url)
    }
}

/// Keys for the official endpoint start with `sk-`; compatible endpoints may differ.
pub fn validate_openai_key(api_key: &str, base_url: &str) -> Result<()> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(Error::ConfigurationError(
            "OPENAI_API_KEY is not set".to_string(),
        ));
    }
    if base_url.trim_end_matches('/') == OPENAI_API_URL && !key.starts_with("sk-") {
        return Err(Error::ConfigurationError(
            "OpenAI API key must start with 'sk-'".to_string(),
        ));
    }
    Ok(())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

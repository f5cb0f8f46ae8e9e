//! Embedding and vector index backends shared by ingestion and querying.

pub mod embeddings;
pub mod local;
pub mod models;
pub mod vector_db;

pub use embeddings::{Embedder, LocalEmbedder, OpenAiEmbedder};
pub use local::LocalIndex;
pub use models::{IndexRecord, IndexStats, RecordMetadata, ScoredRecord};
pub use vector_db::QdrantIndex;

use crate::config::{IndexBackend, IndexSettings};
use crate::error::{Error, Result};

/// Vector index the pipelines write to and read from.
pub enum VectorIndex {
    Qdrant(QdrantIndex),
    Local(LocalIndex),
}

impl VectorIndex {
    /// Build the backend selected in the settings for vectors of `dimension`.
    pub fn from_settings(settings: &IndexSettings, dimension: usize) -> Result<Self> {
        match settings.backend {
            IndexBackend::Qdrant => Ok(Self::Qdrant(QdrantIndex::connect(settings, dimension)?)),
            IndexBackend::Local => Ok(Self::Local(LocalIndex::open(
                &settings.local_path,
                dimension,
            )?)),
        }
    }

    /// Make sure the collection exists before the first write.
    pub async fn ensure_ready(&self) -> Result<()> {
        match self {
            Self::Qdrant(index) => index.ensure_collection().await,
            Self::Local(_) => Ok(()),
        }
    }

    /// Insert or replace records by chunk id.
    pub async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        match self {
            Self::Qdrant(index) => index.upsert(records).await,
            Self::Local(index) => index.upsert(records),
        }
    }

    /// The `top_k` most similar records, best first.
    pub async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredRecord>> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be positive".to_string()));
        }

        let mut hits = match self {
            Self::Qdrant(index) => index.search(vector, top_k as u64).await?,
            Self::Local(index) => index.search(&vector, top_k)?,
        };
        hits.truncate(top_k);
        Ok(hits)
    }

    pub async fn delete_document(&self, source: &str) -> Result<()> {
        match self {
            Self::Qdrant(index) => index.delete_document(source).await,
            Self::Local(index) => index.delete_document(source).map(|_| ()),
        }
    }

    pub async fn count(&self) -> Result<u64> {
        match self {
            Self::Qdrant(index) => index.count().await,
            Self::Local(index) => index.count(),
        }
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            records: self.count().await?,
            dimension: self.dimension(),
        })
    }

    /// Make completed writes durable. Qdrant upserts already wait for the server.
    pub fn flush(&self) -> Result<()> {
        match self {
            Self::Qdrant(_) => Ok(()),
            Self::Local(index) => index.persist(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Qdrant(index) => index.dimension(),
            Self::Local(index) => index.dimension(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Qdrant(index) => format!("qdrant collection '{}'", index.collection()),
            Self::Local(index) => match index.path() {
                Some(path) => format!("local index {}", path.display()),
                None => "in-memory index".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            vector,
            metadata: RecordMetadata {
                source: "Criminal Code".to_string(),
                text: id.to_string(),
                ordinal: 0,
                char_start: 0,
                char_end: id.len(),
            },
        }
    }

    #[tokio::test]
    async fn search_rejects_zero_top_k() {
        let index = VectorIndex::Local(LocalIndex::in_memory(2));
        let err = index.search(vec![1.0, 0.0], 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn top_k_larger_than_index_returns_everything() {
        let index = VectorIndex::Local(LocalIndex::in_memory(2));
        index
            .upsert(&[record("one", vec![1.0, 0.0]), record("two", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = index.search(vec![1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "one");
    }

    #[tokio::test]
    async fn local_backend_from_settings_flushes_to_disk() {
        let dir = tempdir().unwrap();
        let settings = IndexSettings {
            backend: IndexBackend::Local,
            local_path: dir.path().join("index.json"),
            ..IndexSettings::default()
        };

        let index = VectorIndex::from_settings(&settings, 2).unwrap();
        index.ensure_ready().await.unwrap();
        index.upsert(&[record("one", vec![1.0, 0.0])]).await.unwrap();
        index.flush().unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.dimension, 2);
        assert!(index.describe().contains("index.json"));
        assert!(settings.local_path.exists());
    }
}

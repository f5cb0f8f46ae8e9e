//! Vector index integration with Qdrant

use qdrant_client::qdrant::{
    point_id::PointIdOptions, r#match::MatchValue, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, FieldCondition, Filter, Match, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};

use super::models::{IndexRecord, RecordMetadata, ScoredRecord};
use crate::config::IndexSettings;
use crate::documents::chunker::point_id;
use crate::error::{Error, Result};

/// Payload key holding the chunk id; point ids are UUIDs derived from it.
const CHUNK_ID_KEY: &str = "chunk_id";

/// Vector index backed by Qdrant
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Build a client for the configured server. No request is sent yet.
    pub fn connect(settings: &IndexSettings, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&settings.qdrant_url)
            .api_key(settings.qdrant_api_key.clone())
            .build()?;

        Ok(Self {
            client,
            collection: settings.collection.clone(),
            dimension,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create the collection if it doesn't exist
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection '{}' already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection '{}' (dimension {}, cosine)",
            self.collection, self.dimension
        );
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await?;

        Ok(())
    }

    /// Upsert records, waiting until Qdrant has applied them.
    pub async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                PointStruct::new(
                    point_id(&record.id).to_string(),
                    record.vector.clone(),
                    to_payload(record),
                )
            })
            .collect();

        let count = points.len();
        debug!("Upserting {} points to '{}'", count, self.collection);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;

        Ok(count)
    }

    /// Nearest records by cosine similarity, best first.
    pub async fn search(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredRecord>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, limit).with_payload(true),
            )
            .await?;

        response
            .result
            .into_iter()
            .map(|point| {
                let fallback_id = point.id.and_then(|id| match id.point_id_options? {
                    PointIdOptions::Uuid(uuid) => Some(uuid),
                    PointIdOptions::Num(num) => Some(num.to_string()),
                });
                from_payload(&point.payload, fallback_id, point.score)
            })
            .collect()
    }

    /// Delete all records of one document
    pub async fn delete_document(&self, source: &str) -> Result<()> {
        let filter = Filter::must([FieldCondition {
            key: "source".to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(source.to_string())),
            }),
            ..Default::default()
        }
        .into()]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await?;

        debug!("Deleted records of '{}' from '{}'", source, self.collection);
        Ok(())
    }

    /// Number of points in the collection
    pub async fn count(&self) -> Result<u64> {
        let info = self.client.collection_info(&self.collection).await?;

        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0))
    }
}

fn to_payload(record: &IndexRecord) -> HashMap<String, QdrantValue> {
    let meta = &record.metadata;
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert(CHUNK_ID_KEY.into(), record.id.clone().into());
    payload.insert("source".into(), meta.source.clone().into());
    payload.insert("text".into(), meta.text.clone().into());
    payload.insert("ordinal".into(), (meta.ordinal as i64).into());
    payload.insert("char_start".into(), (meta.char_start as i64).into());
    payload.insert("char_end".into(), (meta.char_end as i64).into());
    payload
}

fn from_payload(
    payload: &HashMap<String, QdrantValue>,
    fallback_id: Option<String>,
    score: f32,
) -> Result<ScoredRecord> {
    let missing = |key: &str| {
        Error::IndexServiceError(format!("search hit is missing payload field '{}'", key))
    };
    let text_field = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| missing(key))
    };
    let int_field = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_integer())
            .map(|v| v.max(0) as usize)
            .ok_or_else(|| missing(key))
    };

    let id = match payload.get(CHUNK_ID_KEY).and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => fallback_id.ok_or_else(|| missing(CHUNK_ID_KEY))?,
    };

    Ok(ScoredRecord {
        id,
        score,
        metadata: RecordMetadata {
            source: text_field("source")?,
            text: text_field("text")?,
            ordinal: int_field("ordinal")?,
            char_start: int_field("char_start")?,
            char_end: int_field("char_end")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Chunk;

    fn record() -> IndexRecord {
        let chunk = Chunk::new(
            "Theft is punishable by imprisonment.".to_string(),
            "Criminal Code",
            2,
            400,
            436,
        );
        IndexRecord::from_chunk(&chunk, vec![0.1, 0.2, 0.3])
    }

    #[test]
    fn payload_round_trip_keeps_metadata() {
        let record = record();
        let payload = to_payload(&record);
        let hit = from_payload(&payload, None, 0.87).unwrap();

        assert_eq!(hit.id, record.id);
        assert_eq!(hit.metadata, record.metadata);
        assert!((hit.score - 0.87).abs() < f32::EPSILON);
    }

    #[test]
    fn payload_without_text_is_index_error() {
        let mut payload = to_payload(&record());
        payload.remove("text");

        let err = from_payload(&payload, None, 0.5).unwrap_err();
        assert!(matches!(err, Error::IndexServiceError(_)));
        assert!(err.to_string().contains("'text'"));
    }

    #[test]
    fn missing_chunk_id_falls_back_to_point_id() {
        let mut payload = to_payload(&record());
        payload.remove(CHUNK_ID_KEY);

        let hit = from_payload(&payload, Some("point-1".to_string()), 0.5).unwrap();
        assert_eq!(hit.id, "point-1");
    }

    #[test]
    fn connect_does_not_touch_the_network() {
        let settings = IndexSettings {
            qdrant_url: "http://127.0.0.1:1".to_string(),
            ..IndexSettings::default()
        };
        let index = QdrantIndex::connect(&settings, 8).unwrap();
        assert_eq!(index.collection(), "ethiopian-law");
    }

    #[tokio::test]
    #[ignore] // Requires a running Qdrant server
    async fn test_live_round_trip() {
        let settings = IndexSettings {
            collection: "lawchat-test".to_string(),
            ..IndexSettings::default()
        };
        let index = QdrantIndex::connect(&settings, 3).unwrap();
        index.ensure_collection().await.unwrap();
        index.upsert(&[record()]).await.unwrap();

        let hits = index.search(vec![0.1, 0.2, 0.3], 1).await.unwrap();
        assert_eq!(hits[0].metadata.source, "Criminal Code");

        index.delete_document("Criminal Code").await.unwrap();
    }
}

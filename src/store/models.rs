//! Data models for index records and retrieval results

use serde::{Deserialize, Serialize};

use crate::documents::Chunk;

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Source document name
    pub source: String,
    /// Chunk text, kept for prompting and citation
    pub text: String,
    pub ordinal: usize,
    pub char_start: usize,
    pub char_end: usize,
}

/// A chunk with its embedding, as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Chunk id (`doc_{source}_{ordinal}`)
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            vector,
            metadata: RecordMetadata {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                ordinal: chunk.ordinal,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
            },
        }
    }
}

/// Index record returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// Index statistics
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub records: u64,
    pub dimension: usize,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

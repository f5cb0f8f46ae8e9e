//! File-backed vector index searched in memory

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::models::{cosine_similarity, IndexRecord, ScoredRecord};
use crate::documents::tracker::write_atomic;
use crate::error::{Error, Result};

/// Records keyed by chunk id, optionally mirrored to a JSON file.
pub struct LocalIndex {
    path: Option<PathBuf>,
    dimension: usize,
    records: RwLock<BTreeMap<String, IndexRecord>>,
}

impl LocalIndex {
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            path: None,
            dimension,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the index file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let records: BTreeMap<String, IndexRecord> = match std::fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<IndexRecord> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|r| (r.id.clone(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        if let Some(bad) = records.values().find(|r| r.vector.len() != dimension) {
            return Err(Error::IndexServiceError(format!(
                "{} holds {}-dimensional vectors but the embedder produces {}",
                path.display(),
                bad.vector.len(),
                dimension
            )));
        }

        info!("Opened local index {} ({} records)", path.display(), records.len());
        Ok(Self {
            path: Some(path),
            dimension,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(Error::IndexServiceError(format!(
                "record {} has dimension {}, index expects {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }

        let mut map = self.write()?;
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    /// Best `limit` records by cosine similarity. Equal scores order by id.
    pub fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let map = self.read()?;
        let mut scored: Vec<ScoredRecord> = map
            .values()
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Remove every record of `source`, returning how many were dropped.
    pub fn delete_document(&self, source: &str) -> Result<usize> {
        let mut map = self.write()?;
        let before = map.len();
        map.retain(|_, record| record.metadata.source != source);
        Ok(before - map.len())
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    /// Write the records to disk. In-memory indexes have nothing to do.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let map = self.read()?;
        let list: Vec<&IndexRecord> = map.values().collect();
        let json = serde_json::to_vec(&list)?;
        write_atomic(path, &json)?;
        debug!("Persisted {} records to {}", list.len(), path.display());
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IndexRecord>>> {
        self.records
            .read()
            .map_err(|_| Error::IndexServiceError("local index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IndexRecord>>> {
        self.records
            .write()
            .map_err(|_| Error::IndexServiceError("local index lock poisoned".to_string()))
    }
}

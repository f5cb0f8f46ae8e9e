//! Ingestion pipeline: load → chunk → embed → upsert
//!
//! Documents are processed one at a time. A document's tracking marker is
//! written only after all of its chunks are in the index, so an interrupted
//! run reprocesses it next time; upserts are idempotent on the chunk id.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, IngestSettings};
use crate::documents::loader::{self, document_name};
use crate::documents::{Chunk, Chunker, Document, Fingerprint, IngestLock, ProcessedFiles};
use crate::error::Result;
use crate::metrics;
use crate::store::{Embedder, IndexRecord, VectorIndex};

#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub name: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub name: String,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub processed: Vec<IngestedDocument>,
    /// Unchanged documents that were already indexed
    pub skipped: Vec<String>,
    pub failed: Vec<FailedDocument>,
    pub records_before: u64,
    pub records_after: u64,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Chunks upserted during this run.
    pub fn chunks(&self) -> usize {
        self.processed.iter().map(|d| d.chunks).sum()
    }
}

pub struct Ingestor {
    embedder: Embedder,
    index: VectorIndex,
    chunker: Chunker,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(embedder: Embedder, index: VectorIndex, settings: IngestSettings) -> Self {
        Self {
            chunker: Chunker::new(settings.chunk_size, settings.chunk_overlap),
            embedder,
            index,
            settings,
        }
    }

    /// Build the embedder and index from configuration. No network call is made.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let embedder = Embedder::from_settings(&config.openai)?;
        let index = VectorIndex::from_settings(&config.index, embedder.dimension())?;
        Ok(Self::new(embedder, index, config.ingest.clone()))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Ingest every new or changed document; `force` reprocesses all of them.
    pub async fn run(&self, force: bool) -> Result<IngestReport> {
        let tracking_file = &self.settings.tracking_file;
        let _lock = IngestLock::acquire(IngestLock::path_for(tracking_file))?;
        let mut tracker = ProcessedFiles::load(tracking_file)?;
        let mut report = IngestReport::default();

        let files = loader::discover(&self.settings.docs_dir)?;
        if files.is_empty() {
            warn!(
                "No documents found in {}. Add PDF or text files and run again.",
                self.settings.docs_dir.display()
            );
            return Ok(report);
        }
        info!(
            "Found {} documents in {}",
            files.len(),
            self.settings.docs_dir.display()
        );

        self.index.ensure_ready().await?;
        report.records_before = self.index.count().await?;
        info!(
            "{} holds {} records before ingestion",
            self.index.describe(),
            report.records_before
        );

        for path in &files {
            let name = document_name(path);

            let fingerprint = match Fingerprint::compute(path).await {
                Ok(fp) => fp,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    report.failed.push(FailedDocument {
                        name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !force && tracker.is_current(&name, &fingerprint) {
                info!("Skipping already processed file: {}", name);
                report.skipped.push(name);
                continue;
            }

            // A stale marker must not outlive the records it describes.
            if tracker.remove(&name).is_some() {
                tracker.save()?;
            }

            match self.process_file(path).await {
                Ok(chunks) => {
                    tracker.mark(name.clone(), &fingerprint, chunks);
                    tracker.save()?;
                    info!("Processed {} ({} chunks)", name, chunks);
                    report.processed.push(IngestedDocument { name, chunks });
                }
                Err(e) => {
                    error!("Failed to process {}: {}", name, e);
                    report.failed.push(FailedDocument {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.records_after = self.index.count().await?;
        info!(
            "Ingestion finished: {} processed, {} skipped, {} failed, {} records in index",
            report.processed.len(),
            report.skipped.len(),
            report.failed.len(),
            report.records_after
        );

        Ok(report)
    }

    async fn process_file(&self, path: &Path) -> Result<usize> {
        let document = loader::load(path).await?;
        self.ingest_document(&document).await
    }

    /// Replace a document's records with freshly embedded chunks.
    ///
    /// Every chunk is embedded before the old records are deleted, so an
    /// embedding failure leaves the index untouched.
    pub async fn ingest_document(&self, document: &Document) -> Result<usize> {
        let chunks: Vec<Chunk> = self.chunker.chunk(&document.text, document.name.as_str());
        debug!("Split {} into {} chunks", document.name, chunks.len());

        let batch_size = self.settings.batch_size.max(1);
        let batches = chunks.len().div_ceil(batch_size);
        let mut records: Vec<IndexRecord> = Vec::with_capacity(chunks.len());

        for (i, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_with_retry(&texts).await?;
            records.extend(
                batch
                    .iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector)),
            );
            debug!(
                "Embedded batch {}/{} of {} ({} chunks)",
                i + 1,
                batches,
                document.name,
                batch.len()
            );
        }

        self.index.delete_document(&document.name).await?;

        let mut upserted = 0;
        for batch in records.chunks(batch_size) {
            upserted += self.index.upsert(batch).await?;
            metrics::record_ingested_chunks(batch.len());
        }

        self.index.flush()?;
        Ok(upserted)
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let attempts = self.settings.max_batch_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.embedder.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = Duration::from_millis(self.settings.retry_backoff_ms * attempt as u64);
                    warn!(
                        "Embedding attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//! Processed-file tracking
//!
//! Provides:
//! - The filename → marker record used to skip unchanged documents
//! - Atomic write-then-rename for files that must never be left torn
//! - File-based locking so two ingestion runs never interleave

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identity of a document file's content on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    /// Modification time, seconds since the epoch
    pub mtime: i64,
    pub sha256: String,
}

impl Fingerprint {
    pub async fn compute(path: &Path) -> Result<Self> {
        let shown = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::document_read(&shown, e.to_string()))?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::document_read(&shown, e.to_string()))?;

        let mtime = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or(0);

        Ok(Self {
            size: bytes.len() as u64,
            mtime,
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }
}

/// Marker stored for each fully ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMarker {
    pub size: u64,
    pub mtime: i64,
    pub sha256: String,
    pub chunks: usize,
    pub processed_at: DateTime<Utc>,
}

/// Persisted mapping from document filename to its processing marker.
#[derive(Debug, Clone)]
pub struct ProcessedFiles {
    path: PathBuf,
    entries: BTreeMap<String, FileMarker>,
}

impl ProcessedFiles {
    /// Load the tracking file. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Error reading tracking file {} ({}). Starting with empty tracking.",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when `name` was ingested from byte-identical content.
    pub fn is_current(&self, name: &str, fingerprint: &Fingerprint) -> bool {
        self.entries
            .get(name)
            .map(|marker| marker.sha256 == fingerprint.sha256 && marker.size == fingerprint.size)
            .unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FileMarker> {
        self.entries.get(name)
    }

    pub fn mark(&mut self, name: impl Into<String>, fingerprint: &Fingerprint, chunks: usize) {
        self.entries.insert(
            name.into(),
            FileMarker {
                size: fingerprint.size,
                mtime: fingerprint.mtime,
                sha256: fingerprint.sha256.clone(),
                chunks,
                processed_at: Utc::now(),
            },
        );
    }

    /// Forget a document so the next run reprocesses it.
    pub fn remove(&mut self, name: &str) -> Option<FileMarker> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileMarker)> {
        self.entries.iter()
    }

    pub fn total_chunks(&self) -> usize {
        self.entries.values().map(|m| m.chunks).sum()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.entries.values().map(|m| m.processed_at).max()
    }

    /// Persist the record atomically.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&self.path, &json)?;
        debug!("Saved {} tracking entries to {}", self.len(), self.path.display());
        Ok(())
    }
}

/// Write `bytes` to a temp file next to `path`, then rename over it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::IoError(e.error))?;
    Ok(())
}

/// Lock guard that ensures only one ingestion run touches the tracking file.
pub struct IngestLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl IngestLock {
    /// Lock file path used alongside a tracking file.
    pub fn path_for(tracking_file: &Path) -> PathBuf {
        tracking_file.with_extension("lock")
    }

    /// Acquire an exclusive lock.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!(
                    "another ingestion run holds {}; wait for it to finish",
                    path.display()
                ),
            ))),
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fingerprint(sha: &str) -> Fingerprint {
        Fingerprint {
            size: 10,
            mtime: 1_700_000_000,
            sha256: sha.to_string(),
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let tracker = ProcessedFiles::load(dir.path().join("processed_files.json")).unwrap();
        assert!(tracker.is_empty());
        assert_eq!(tracker.last_updated(), None);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed_files.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let tracker = ProcessedFiles::load(&path).unwrap();
        assert!(tracker.is_empty());
    }

    #[test]
    fn mark_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("processed_files.json");

        let mut tracker = ProcessedFiles::load(&path).unwrap();
        tracker.mark("constitution.pdf", &fingerprint("aaa"), 120);
        tracker.mark("criminal_code.pdf", &fingerprint("bbb"), 300);
        tracker.save().unwrap();

        let reloaded = ProcessedFiles::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.total_chunks(), 420);
        assert_eq!(reloaded.get("constitution.pdf").unwrap().chunks, 120);
        assert!(reloaded.last_updated().is_some());
    }

    #[test]
    fn is_current_compares_content_hash() {
        let dir = tempdir().unwrap();
        let mut tracker = ProcessedFiles::load(dir.path().join("t.json")).unwrap();
        tracker.mark("constitution.pdf", &fingerprint("aaa"), 1);

        assert!(tracker.is_current("constitution.pdf", &fingerprint("aaa")));
        assert!(!tracker.is_current("constitution.pdf", &fingerprint("changed")));
        assert!(!tracker.is_current("unknown.pdf", &fingerprint("aaa")));

        let mut touched = fingerprint("aaa");
        touched.mtime += 60;
        assert!(tracker.is_current("constitution.pdf", &touched));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn fingerprint_hashes_content() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "Article 1").unwrap();
        std::fs::write(&b, "Article 1").unwrap();

        let fa = Fingerprint::compute(&a).await.unwrap();
        let fb = Fingerprint::compute(&b).await.unwrap();
        assert_eq!(fa.sha256, fb.sha256);
        assert_eq!(fa.size, 9);
        assert_eq!(fa.sha256.len(), 64);

        std::fs::write(&b, "Article 2").unwrap();
        let changed = Fingerprint::compute(&b).await.unwrap();
        assert_ne!(fa.sha256, changed.sha256);
    }

    #[test]
    fn ingest_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = IngestLock::path_for(&dir.path().join("processed_files.json"));
        assert!(path.ends_with("processed_files.lock"));

        let mut first = IngestLock::acquire(&path).unwrap();
        assert!(IngestLock::acquire(&path).is_err());

        first.release();
        assert!(!path.exists());
        let _second = IngestLock::acquire(&path).unwrap();
    }
}

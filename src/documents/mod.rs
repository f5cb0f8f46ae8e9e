//! Document handling for the ingestion pipeline.
//!
//! - `loader` finds legal texts on disk and extracts their text
//! - `chunker` slices text into bounded, citable chunks
//! - `tracker` remembers which files were already ingested

pub mod chunker;
pub mod loader;
pub mod tracker;

pub use chunker::{Chunk, Chunker};
pub use loader::Document;
pub use tracker::{Fingerprint, IngestLock, ProcessedFiles};

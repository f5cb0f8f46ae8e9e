//! Stats command: what has been ingested so far

use anyhow::Result;

use crate::config::Config;
use crate::documents::ProcessedFiles;
use crate::store::VectorIndex;

pub async fn run() -> Result<()> {
    let config = Config::new();
    config.validate()?;
    let tracker = ProcessedFiles::load(&config.ingest.tracking_file)?;

    println!("📊 LawChat statistics");
    println!("   Documents directory: {}", config.ingest.docs_dir.display());
    println!("   Tracked documents: {}", tracker.len());
    for (name, marker) in tracker.iter() {
        println!(
            "     • {} ({} chunks, {})",
            name,
            marker.chunks,
            marker.processed_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("   Total chunks: {}", tracker.total_chunks());
    match tracker.last_updated() {
        Some(at) => println!("   Last updated: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("   Last updated: never"),
    }

    match VectorIndex::from_settings(&config.index, config.openai.embedding_dimension) {
        Ok(index) => match index.stats().await {
            Ok(stats) => println!(
                "   Index: {} ({} records, {} dimensions)",
                index.describe(),
                stats.records,
                stats.dimension
            ),
            Err(e) => println!("   Index: {} unavailable ({})", index.describe(), e),
        },
        Err(e) => println!("   Index: unavailable ({})", e),
    }

    Ok(())
}

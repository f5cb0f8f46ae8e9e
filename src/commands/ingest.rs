//! Ingest command: index new or changed legal documents

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::info;

use crate::config::Config;
use crate::rag::{IngestReport, Ingestor};

#[derive(Debug, Clone, Default)]
pub struct IngestArgs {
    /// Reprocess documents even when unchanged
    pub force: bool,
    /// Overrides `ingest.docs_dir`
    pub docs_dir: Option<PathBuf>,
}

pub async fn run(args: IngestArgs) -> Result<()> {
    let mut config = Config::new();
    if let Some(dir) = args.docs_dir {
        config.ingest.docs_dir = dir;
    }

    let ingestor = Ingestor::from_config(&config)?;
    info!(
        "Ingesting {} into {}{}",
        config.ingest.docs_dir.display(),
        ingestor.index().describe(),
        if args.force { " (forced)" } else { "" }
    );

    let report = ingestor.run(args.force).await?;
    print_report(&report);

    if report.has_failures() {
        bail!("{} document(s) failed to ingest", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("📚 Ingestion summary");
    println!("   Processed: {}", report.processed.len());
    for doc in &report.processed {
        println!("     • {} ({} chunks)", doc.name, doc.chunks);
    }
    println!("   Skipped (unchanged): {}", report.skipped.len());
    if !report.failed.is_empty() {
        println!("   Failed: {}", report.failed.len());
        for doc in &report.failed {
            println!("     ✗ {}: {}", doc.name, doc.reason);
        }
    }
    println!(
        "   Index records: {} → {}",
        report.records_before, report.records_after
    );
}

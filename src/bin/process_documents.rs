//! CLI tool for ingesting legal documents into the vector index

use anyhow::Result;
use clap::Parser;
use lawchat::commands::{ingest_run, IngestArgs};
use lawchat::metrics;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "process_documents")]
#[command(about = "Chunk, embed and index PDF and text documents")]
struct Cli {
    /// Reprocess every document, even unchanged ones
    #[arg(short, long)]
    force: bool,

    /// Documents directory (defaults to ingest.docs_dir)
    #[arg(long, env = "LAWCHAT_DOCS_DIR")]
    docs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lawchat=info".parse()?))
        .init();

    let cli = Cli::parse();

    metrics::record_command_start("process_documents");
    let start = Instant::now();

    let result = ingest_run(IngestArgs {
        force: cli.force,
        docs_dir: cli.docs_dir,
    })
    .await;

    metrics::record_command_result("process_documents", start.elapsed(), result.is_ok());
    result
}

//! LawChat CLI - main entry point
//!
//! Ingest Ethiopian legal documents and ask grounded questions about them.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use lawchat::commands::{self, IngestArgs};
use lawchat::metrics;
use tracing::warn;

#[derive(Parser)]
#[command(name = "lawchat")]
#[command(about = "Legal Q&A over Ethiopian law with cited sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new or changed documents from the documents directory
    Ingest {
        /// Reprocess every document, even unchanged ones
        #[arg(short, long, default_value_t = false)]
        force: bool,

        /// Documents directory (defaults to ingest.docs_dir)
        #[arg(long, env = "LAWCHAT_DOCS_DIR")]
        docs_dir: Option<PathBuf>,
    },

    /// Answer a single question
    Ask {
        /// The question to answer
        question: String,

        /// Number of passages to retrieve (defaults to query.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer and its sources as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Interactive chat session
    Chat,

    /// Show ingested documents and index size
    Stats,

    /// Validate the OpenAI API key with a one-word embedding request
    CheckKey,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest { .. } => "ingest",
            Commands::Ask { .. } => "ask",
            Commands::Chat => "chat",
            Commands::Stats => "stats",
            Commands::CheckKey => "check_key",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lawchat=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { force, docs_dir } => {
            commands::ingest_run(IngestArgs { force, docs_dir }).await
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => commands::ask_run(&question, top_k, json).await,
        Commands::Chat => commands::chat_run().await,
        Commands::Stats => commands::stats_run().await,
        Commands::CheckKey => commands::check_key_run().await,
    }
}

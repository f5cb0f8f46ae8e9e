//! Interactive chat command
//!
//! Reads questions from stdin and answers them in one session, so follow-up
//! questions see the earlier turns.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::Config;
use crate::rag::{render_answer, QueryPipeline, QueryRequest};
use crate::session::ChatSession;

const HELP: &str = "Commands:
  help     - show this message
  stats    - session statistics
  history  - recent questions
  sources  - sources of the last answer
  clear    - forget the conversation
  exit     - quit";

pub async fn run() -> Result<()> {
    let config = Config::new();
    let pipeline = QueryPipeline::from_config(&config)?;
    let mut session = ChatSession::new(&config.query);

    match pipeline.index().count().await {
        Ok(0) => warn!("The index is empty. Run `lawchat ingest` first."),
        Ok(n) => println!("⚖️  LawChat ready: {} indexed passages", n),
        Err(e) => warn!("Could not reach {}: {}", pipeline.index().describe(), e),
    }
    println!("Ask a question about Ethiopian law. Type 'help' for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("❓ ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" | "q" => break,
            "help" => {
                println!("{}\n", HELP);
                continue;
            }
            "clear" => {
                session.clear();
                println!("✅ Conversation cleared\n");
                continue;
            }
            "stats" => {
                print_stats(&session);
                continue;
            }
            "history" => {
                print_history(&session);
                continue;
            }
            "sources" => {
                println!("{}\n", render_answer("Last answer", session.last_sources()));
                continue;
            }
            _ => {}
        }

        match pipeline.answer(&QueryRequest::new(input), &mut session).await {
            Ok(answer) => {
                let marker = if answer.cached { " (cached)" } else { "" };
                println!("\n🤖{}\n{}\n", marker, answer.render());
                println!("{}", "-".repeat(80));
            }
            Err(failure) => {
                println!("\n❌ {}", failure.user_message());
                if !failure.sources.is_empty() {
                    println!("{}", render_answer("", &failure.sources));
                }
                println!();
            }
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("📊 Session statistics");
    println!("   Questions: {}", stats.queries);
    println!("   Answered from cache: {}", stats.cached_answers);
    println!("   Duration: {}s", stats.duration_secs);
    println!("   Sources in last answer: {}", stats.sources_found);
    match stats.avg_response_ms {
        Some(ms) => println!("   Average response: {} ms\n", ms),
        None => println!("   Average response: n/a\n"),
    }
}

fn print_history(session: &ChatSession) {
    if session.search_history().is_empty() {
        println!("No questions yet.\n");
        return;
    }
    for (i, entry) in session.search_history().iter().enumerate() {
        println!(
            "{:>2}. [{}] {}\n      {}",
            i + 1,
            entry.asked_at.format("%H:%M"),
            entry.query,
            entry.preview
        );
    }
    println!();
}

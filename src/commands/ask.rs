//! Ask command: answer a single question and exit

use anyhow::{anyhow, Result};

use crate::config::Config;
use crate::rag::{QueryPipeline, QueryRequest};
use crate::session::ChatSession;

pub async fn run(question: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let config = Config::new();
    let pipeline = QueryPipeline::from_config(&config)?;
    let mut session = ChatSession::new(&config.query);

    let mut request = QueryRequest::new(question);
    if let Some(k) = top_k {
        request = request.with_top_k(k);
    }

    match pipeline.answer(&request, &mut session).await {
        Ok(answer) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.render());
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("❌ {}", failure.user_message());
            if !failure.sources.is_empty() {
                eprintln!("{}", crate::rag::render_answer("", &failure.sources));
            }
            Err(anyhow!(failure))
        }
    }
}

//! Check-key command: validate the OpenAI API key with a live call

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::store::OpenAiEmbedder;

pub async fn run() -> Result<()> {
    let config = Config::new();
    config.validate_api_key()?;
    println!("✓ API key format looks valid");

    let embedder = OpenAiEmbedder::new(&config.openai)?;
    info!(
        "Probing {} with model {}",
        config.openai.base_url, config.openai.embedding_model
    );
    embedder.verify().await?;

    println!("✓ API key accepted by {}", config.openai.base_url);
    Ok(())
}

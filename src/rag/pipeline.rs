//! Query pipeline: embed → retrieve → prompt → generate → format

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use super::format::{render_answer, sources_for, Source};
use super::prompt::PromptBuilder;
use crate::config::{Config, QuerySettings};
use crate::error::{Error, Result};
use crate::integrations::openai::OpenAIClient;
use crate::metrics;
use crate::session::ChatSession;
use crate::store::{Embedder, ScoredRecord, VectorIndex};

/// A question for the pipeline.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    /// Overrides the configured `top_k`
    pub top_k: Option<usize>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Answer text with the sources that were in its prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<Source>,
    pub model: String,
    pub cached: bool,
    pub elapsed_ms: u64,
}

impl Answer {
    pub fn render(&self) -> String {
        render_answer(&self.text, &self.sources)
    }
}

/// Pipeline stage a question can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStage {
    /// Question checks before any network call
    Validation,
    Embedding,
    Retrieving,
    Prompting,
    Generating,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Validation => "validation",
            QueryStage::Embedding => "embedding",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Prompting => "prompting",
            QueryStage::Generating => "generating",
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-question state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Embedding,
    Retrieving,
    Prompting,
    Generating,
    Done,
    Failed(QueryStage),
}

impl QueryState {
    /// The next state on success. Terminal states stay put.
    pub fn advance(self) -> Self {
        match self {
            QueryState::Idle => QueryState::Embedding,
            QueryState::Embedding => QueryState::Retrieving,
            QueryState::Retrieving => QueryState::Prompting,
            QueryState::Prompting => QueryState::Generating,
            QueryState::Generating => QueryState::Done,
            terminal => terminal,
        }
    }

    /// The state after a failure in the current stage.
    pub fn fail(self) -> Self {
        match self.stage() {
            Some(stage) => QueryState::Failed(stage),
            None if self == QueryState::Idle => QueryState::Failed(QueryStage::Validation),
            None => self,
        }
    }

    /// The stage being worked on, if any.
    pub fn stage(&self) -> Option<QueryStage> {
        match self {
            QueryState::Embedding => Some(QueryStage::Embedding),
            QueryState::Retrieving => Some(QueryStage::Retrieving),
            QueryState::Prompting => Some(QueryStage::Prompting),
            QueryState::Generating => Some(QueryStage::Generating),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed(_))
    }
}

/// A failed question: the stage, the cause, and any sources found before it.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct QueryFailure {
    pub stage: QueryStage,
    #[source]
    pub error: Error,
    pub sources: Vec<Source>,
}

impl QueryFailure {
    /// Message safe to show an end user. Provider details stay in the logs.
    pub fn user_message(&self) -> String {
        match (self.stage, &self.error) {
            (QueryStage::Validation, Error::InvalidQuery(reason)) => {
                format!("Please enter a valid question: {}.", reason)
            }
            (QueryStage::Validation, _) => "Please enter a valid question.".to_string(),
            (QueryStage::Embedding, _) => {
                "Could not process your question: the embedding service is unavailable. \
                 Please try again shortly."
                    .to_string()
            }
            (QueryStage::Retrieving, _) => {
                "Could not search the legal documents right now. Please try again shortly."
                    .to_string()
            }
            (QueryStage::Prompting, _) => {
                "Could not prepare the request for the language model.".to_string()
            }
            (QueryStage::Generating, _) => format!(
                "The language model did not return an answer. {} relevant source(s) were found \
                 and are listed below.",
                self.sources.len()
            ),
        }
    }
}

/// Runs questions through embedding, retrieval, prompting and generation.
pub struct QueryPipeline {
    embedder: Embedder,
    index: VectorIndex,
    generator: OpenAIClient,
    prompts: PromptBuilder,
    settings: QuerySettings,
}

impl QueryPipeline {
    pub fn new(
        embedder: Embedder,
        index: VectorIndex,
        generator: OpenAIClient,
        settings: QuerySettings,
    ) -> Self {
        Self {
            prompts: PromptBuilder::from_settings(&settings),
            embedder,
            index,
            generator,
            settings,
        }
    }

    /// Build every backend from configuration. No network call is made.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let generator = OpenAIClient::from_settings(&config.openai)?;
        let embedder = Embedder::from_settings(&config.openai)?;
        let index = VectorIndex::from_settings(&config.index, embedder.dimension())?;
        Ok(Self::new(embedder, index, generator, config.query.clone()))
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Embed a question and return the `top_k` nearest chunks.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<ScoredRecord>> {
        let vector = self.embedder.embed(question).await?;
        self.index.search(vector, top_k).await
    }

    /// Answer one question, recording the turn in `session` on success.
    pub async fn answer(
        &self,
        request: &QueryRequest,
        session: &mut ChatSession,
    ) -> std::result::Result<Answer, QueryFailure> {
        let started = Instant::now();
        let mut state = QueryState::Idle;

        let (question, top_k) = self
            .validate(request)
            .map_err(|e| self.fail(state, e, Vec::new()))?;

        // Cached answers were retrieved at the default depth.
        let cacheable = top_k == self.settings.top_k;
        if let Some(hit) = session.cached(&question).filter(|_| cacheable) {
            info!("Serving cached answer for '{}'", question);
            let answer = Answer {
                question: question.clone(),
                text: hit.answer.clone(),
                sources: hit.sources.clone(),
                model: self.generator.model().to_string(),
                cached: true,
                elapsed_ms: elapsed_ms(started),
            };
            session.record(
                &question,
                &answer.text,
                answer.sources.clone(),
                started.elapsed(),
                true,
            );
            return Ok(answer);
        }

        state = self.enter(state);
        let vector = timed(QueryStage::Embedding, self.embedder.embed(&question))
            .await
            .map_err(|e| self.fail(state, e, Vec::new()))?;

        state = self.enter(state);
        let hits = timed(QueryStage::Retrieving, self.index.search(vector, top_k))
            .await
            .map_err(|e| self.fail(state, e, Vec::new()))?;
        debug!("Retrieved {} chunks for '{}'", hits.len(), question);

        state = self.enter(state);
        let prompt_started = Instant::now();
        let prompt = self
            .prompts
            .build(&question, &hits, &session.conversation());
        metrics::record_stage_duration(QueryStage::Prompting.as_str(), prompt_started.elapsed());
        if prompt.dropped(hits.len()) > 0 {
            debug!(
                "Dropped {} lowest-ranked chunks to fit {} context chars",
                prompt.dropped(hits.len()),
                self.settings.max_context_chars
            );
        }
        let sources = sources_for(&prompt.included, self.settings.source_preview_chars);

        state = self.enter(state);
        let text = timed(
            QueryStage::Generating,
            self.generator.chat_completion(prompt.messages),
        )
        .await
        .map_err(|e| self.fail(state, e, sources.clone()))?;

        state = state.advance();
        debug!("Question finished in state {:?}", state);

        let elapsed = started.elapsed();
        info!(
            "Answered '{}' with {} sources in {:.1}s",
            question,
            sources.len(),
            elapsed.as_secs_f64()
        );

        if cacheable {
            session.record(&question, &text, sources.clone(), elapsed, false);
        } else {
            session.record_uncached(&question, &text, sources.clone(), elapsed);
        }

        Ok(Answer {
            question,
            text,
            sources,
            model: self.generator.model().to_string(),
            cached: false,
            elapsed_ms: elapsed_ms(started),
        })
    }

    fn validate(&self, request: &QueryRequest) -> Result<(String, usize)> {
        let question = validate_question(
            &request.question,
            self.settings.min_query_chars,
            self.settings.max_query_chars,
        )?;
        let top_k = request.top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be positive".to_string()));
        }
        Ok((question, top_k))
    }

    fn enter(&self, state: QueryState) -> QueryState {
        let next = state.advance();
        debug!("Query state {:?} -> {:?}", state, next);
        next
    }

    fn fail(&self, state: QueryState, error: Error, sources: Vec<Source>) -> QueryFailure {
        let stage = match state.fail() {
            QueryState::Failed(stage) => stage,
            _ => QueryStage::Validation,
        };
        metrics::record_query_failure(stage.as_str());
        if stage == QueryStage::Validation {
            debug!("Rejected question: {}", error);
        } else {
            error!("Query failed during {}: {}", stage, error);
        }
        QueryFailure {
            stage,
            error,
            sources,
        }
    }
}

/// Trimmed question if its length is within bounds.
pub fn validate_question(question: &str, min_chars: usize, max_chars: usize) -> Result<String> {
    let trimmed = question.trim();
    let len = trimmed.chars().count();
    if len < min_chars {
        return Err(Error::InvalidQuery(format!(
            "the question must be at least {} characters",
            min_chars
        )));
    }
    if len > max_chars {
        return Err(Error::InvalidQuery(format!(
            "the question must be at most {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}

async fn timed<T>(stage: QueryStage, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let started = Instant::now();
    let result = fut.await;
    metrics::record_stage_duration(stage.as_str(), started.elapsed());
    result
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiSettings;
    use crate::documents::Chunk;
    use crate::store::{IndexRecord, LocalEmbedder, LocalIndex};
    use httpmock::prelude::*;
    use serde_json::json;

    const DIM: usize = 256;

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    async fn pipeline(server: &MockServer, texts: &[(&str, &str)]) -> QueryPipeline {
        let embedder = Embedder::Local(LocalEmbedder::new(DIM));
        let index = VectorIndex::Local(LocalIndex::in_memory(DIM));

        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, (source, text))| {
                Chunk::new(text.to_string(), *source, i, 0, text.chars().count())
            })
            .collect();
        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&inputs).await.unwrap();
        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector))
            .collect();
        index.upsert(&records).await.unwrap();

        let generator = OpenAIClient::from_settings(&OpenAiSettings {
            api_key: "sk-test".to_string(),
            base_url: server.base_url(),
            timeout_secs: 1,
            ..OpenAiSettings::default()
        })
        .unwrap();

        QueryPipeline::new(embedder, index, generator, QuerySettings::default())
            .with_prompt_builder(PromptBuilder::new("Context:\n{context}", 12_000, 6))
    }

    fn session() -> ChatSession {
        ChatSession::new(&QuerySettings::default())
    }

    #[test]
    fn state_machine_walks_every_stage() {
        let mut state = QueryState::Idle;
        let mut seen = vec![state];
        while !state.is_terminal() {
            state = state.advance();
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                QueryState::Idle,
                QueryState::Embedding,
                QueryState::Retrieving,
                QueryState::Prompting,
                QueryState::Generating,
                QueryState::Done,
            ]
        );
        assert_eq!(QueryState::Done.advance(), QueryState::Done);
    }

    #[test]
    fn failures_report_their_stage() {
        assert_eq!(
            QueryState::Idle.fail(),
            QueryState::Failed(QueryStage::Validation)
        );
        assert_eq!(
            QueryState::Retrieving.fail(),
            QueryState::Failed(QueryStage::Retrieving)
        );
        assert_eq!(
            QueryState::Generating.fail(),
            QueryState::Failed(QueryStage::Generating)
        );
        assert_eq!(QueryState::Done.fail(), QueryState::Done);
    }

    #[test]
    fn validate_question_bounds() {
        assert!(validate_question("hi", 3, 500).is_err());
        assert!(validate_question("   abc   ", 3, 500).is_ok());
        assert!(validate_question(&"a".repeat(501), 3, 500).is_err());
        assert_eq!(validate_question(" theft? ", 3, 500).unwrap(), "theft?");
    }

    #[test]
    fn user_message_hides_provider_details() {
        let failure = QueryFailure {
            stage: QueryStage::Embedding,
            error: Error::EmbeddingServiceError("401 sk-secret invalid".to_string()),
            sources: Vec::new(),
        };
        let message = failure.user_message();
        assert!(message.contains("embedding service"));
        assert!(!message.contains("sk-secret"));
        assert!(failure.to_string().starts_with("embedding failed"));
    }

    #[tokio::test]
    async fn short_question_fails_before_any_call() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("unused"));
        });
        let pipeline = pipeline(&server, &[("a", "some text")]).await;
        let mut session = session();

        let failure = pipeline
            .answer(&QueryRequest::new("hi"), &mut session)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, QueryStage::Validation);
        assert!(matches!(failure.error, Error::InvalidQuery(_)));
        assert!(failure.user_message().contains("at least 3"));
        assert!(session.turns().is_empty());
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn answers_with_sources_and_records_turn() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("Source 1 [Criminal Code]: Theft is punishable by imprisonment.")
                });
            then.status(200)
                .json_body(completion("Theft is punishable by imprisonment [Source 1]."));
        });

        let pipeline = pipeline(
            &server,
            &[
                ("Criminal Code", "Theft is punishable by imprisonment."),
                ("Constitution", "Every person has a right to hold opinions."),
            ],
        )
        .await;
        let mut session = session();

        let answer = pipeline
            .answer(
                &QueryRequest::new("What is the penalty for theft?"),
                &mut session,
            )
            .await
            .unwrap();

        mock.assert_calls(1);
        assert!(!answer.cached);
        assert_eq!(answer.sources[0].document, "Criminal Code");
        assert_eq!(answer.sources.len(), 2);
        assert!(answer.render().contains("[Source 1] Criminal Code"));
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.last_sources(), answer.sources.as_slice());
    }

    #[tokio::test]
    async fn repeated_question_is_served_from_cache() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("Imprisonment."));
        });
        let pipeline = pipeline(&server, &[("Criminal Code", "Theft is punishable.")]).await;
        let mut session = session();

        pipeline
            .answer(&QueryRequest::new("Penalty for theft?"), &mut session)
            .await
            .unwrap();
        let second = pipeline
            .answer(&QueryRequest::new("  penalty FOR theft?"), &mut session)
            .await
            .unwrap();

        mock.assert_calls(1);
        assert!(second.cached);
        assert_eq!(second.text, "Imprisonment.");
        assert_eq!(session.turns().len(), 2);
    }

    #[tokio::test]
    async fn custom_top_k_bypasses_cache() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("Imprisonment."));
        });
        let pipeline = pipeline(
            &server,
            &[
                ("Criminal Code", "Theft is punishable."),
                ("Constitution", "Every person has a right to property."),
            ],
        )
        .await;
        let mut session = session();

        let broad = pipeline
            .answer(&QueryRequest::new("Penalty for theft?"), &mut session)
            .await
            .unwrap();
        let narrow = pipeline
            .answer(&QueryRequest::new("Penalty for theft?").with_top_k(1), &mut session)
            .await
            .unwrap();
        let again = pipeline
            .answer(&QueryRequest::new("Penalty for theft?"), &mut session)
            .await
            .unwrap();

        mock.assert_calls(2);
        assert_eq!(broad.sources.len(), 2);
        assert!(!narrow.cached);
        assert_eq!(narrow.sources.len(), 1);
        assert!(again.cached);
        assert_eq!(again.sources.len(), 2);
        assert_eq!(session.turns().len(), 3);
    }

    #[tokio::test]
    async fn generation_failure_keeps_sources_and_session() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("upstream exploded");
        });
        let pipeline = pipeline(&server, &[("Criminal Code", "Theft is punishable.")]).await;
        let mut session = session();

        let failure = pipeline
            .answer(&QueryRequest::new("Penalty for theft?"), &mut session)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, QueryStage::Generating);
        assert!(matches!(failure.error, Error::GenerationServiceError(_)));
        assert_eq!(failure.sources.len(), 1);
        assert!(!failure.user_message().contains("exploded"));
        assert!(session.turns().is_empty());
        assert!(session.cached("Penalty for theft?").is_none());
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected() {
        let server = MockServer::start_async().await;
        let pipeline = pipeline(&server, &[("a", "text")]).await;
        let mut session = session();

        let failure = pipeline
            .answer(&QueryRequest::new("valid question").with_top_k(0), &mut session)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, QueryStage::Validation);
    }

    #[tokio::test]
    async fn follow_up_replays_previous_turn() {
        let server = MockServer::start_async().await;
        let follow_up = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("First answer.") && body.contains("And for robbery?")
                });
            then.status(200).json_body(completion("Second answer."));
        });
        let first = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(completion("First answer."));
        });

        let pipeline = pipeline(&server, &[("Criminal Code", "Theft and robbery.")]).await;
        let mut session = session();

        pipeline
            .answer(&QueryRequest::new("Penalty for theft?"), &mut session)
            .await
            .unwrap();
        let answer = pipeline
            .answer(&QueryRequest::new("And for robbery?"), &mut session)
            .await
            .unwrap();

        assert_eq!(answer.text, "Second answer.");
        first.assert_calls(1);
        follow_up.assert_calls(1);
    }
}

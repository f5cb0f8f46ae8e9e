//! Conversation state for one chat session
//!
//! Provides:
//! - Conversation turns replayed as context for follow-up questions
//! - Deduplicated search history with short answer previews
//! - A small time-limited answer cache keyed by the normalized question
//! - Session statistics
//!
//! A session is an ordinary value owned by the caller. Failed turns never
//! touch it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::QuerySettings;
use crate::integrations::openai::ChatMessage;
use crate::rag::Source;

/// Characters of the answer kept in a search history entry.
pub const HISTORY_PREVIEW_CHARS: usize = 100;

/// One answered question.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub asked_at: DateTime<Utc>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub preview: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    stored_at: Instant,
}

/// Session statistics for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub queries: usize,
    pub duration_secs: u64,
    pub sources_found: usize,
    /// Mean time of answers that were not served from the cache
    pub avg_response_ms: Option<u64>,
    pub cached_answers: usize,
}

#[derive(Debug)]
pub struct ChatSession {
    turns: Vec<Turn>,
    last_sources: Vec<Source>,
    search_history: Vec<HistoryEntry>,
    cache: HashMap<String, CachedAnswer>,
    started_at: Instant,
    generated: usize,
    generation_time: Duration,
    history_limit: usize,
    cache_ttl: Duration,
    cache_capacity: usize,
}

impl ChatSession {
    pub fn new(settings: &QuerySettings) -> Self {
        Self::with_limits(
            settings.history_limit,
            Duration::from_secs(settings.cache_ttl_secs),
            settings.cache_capacity,
        )
    }

    pub fn with_limits(history_limit: usize, cache_ttl: Duration, cache_capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            last_sources: Vec::new(),
            search_history: Vec::new(),
            cache: HashMap::new(),
            started_at: Instant::now(),
            generated: 0,
            generation_time: Duration::ZERO,
            history_limit,
            cache_ttl,
            cache_capacity,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_sources(&self) -> &[Source] {
        &self.last_sources
    }

    pub fn search_history(&self) -> &[HistoryEntry] {
        &self.search_history
    }

    /// Prior turns as alternating user/assistant messages.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|turn| {
                [
                    ChatMessage::user(turn.question.clone()),
                    ChatMessage::assistant(turn.answer.clone()),
                ]
            })
            .collect()
    }

    /// A fresh cached answer for this question, if any.
    pub fn cached(&self, question: &str) -> Option<&CachedAnswer> {
        self.cached_at(question, Instant::now())
    }

    fn cached_at(&self, question: &str, now: Instant) -> Option<&CachedAnswer> {
        self.cache
            .get(&cache_key(question))
            .filter(|entry| now.saturating_duration_since(entry.stored_at) < self.cache_ttl)
    }

    /// Record a successful turn.
    pub fn record(
        &mut self,
        question: &str,
        answer: &str,
        sources: Vec<Source>,
        elapsed: Duration,
        cached: bool,
    ) {
        if !cached {
            self.store_in_cache(question.trim(), answer, &sources, Instant::now());
        }
        self.push_turn(question, answer, sources, elapsed, cached);
    }

    /// Record a generated turn whose answer must not be served again, such as
    /// one retrieved with a non-default `top_k`.
    pub fn record_uncached(
        &mut self,
        question: &str,
        answer: &str,
        sources: Vec<Source>,
        elapsed: Duration,
    ) {
        self.push_turn(question, answer, sources, elapsed, false);
    }

    fn push_turn(
        &mut self,
        question: &str,
        answer: &str,
        sources: Vec<Source>,
        elapsed: Duration,
        cached: bool,
    ) {
        let question = question.trim().to_string();

        if !cached {
            self.generated += 1;
            self.generation_time += elapsed;
        }

        self.add_to_history(&question, answer);
        self.last_sources = sources.clone();
        self.turns.push(Turn {
            question,
            answer: answer.to_string(),
            sources,
            asked_at: Utc::now(),
            cached,
        });
    }

    fn store_in_cache(&mut self, question: &str, answer: &str, sources: &[Source], now: Instant) {
        if self.cache_capacity == 0 {
            return;
        }

        self.cache.insert(
            cache_key(question),
            CachedAnswer {
                answer: answer.to_string(),
                sources: sources.to_vec(),
                stored_at: now,
            },
        );

        while self.cache.len() > self.cache_capacity {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.cache.remove(&key);
                }
                None => break,
            }
        }
    }

    fn add_to_history(&mut self, query: &str, answer: &str) {
        if query.is_empty() || self.search_history.iter().any(|h| h.query == query) {
            return;
        }

        self.search_history.push(HistoryEntry {
            query: query.to_string(),
            preview: preview(answer, HISTORY_PREVIEW_CHARS),
            asked_at: Utc::now(),
        });

        if self.search_history.len() > self.history_limit {
            let excess = self.search_history.len() - self.history_limit;
            self.search_history.drain(..excess);
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            queries: self.turns.len(),
            duration_secs: self.started_at.elapsed().as_secs(),
            sources_found: self.last_sources.len(),
            avg_response_ms: (self.generated > 0)
                .then(|| (self.generation_time.as_millis() / self.generated as u128) as u64),
            cached_answers: self.turns.iter().filter(|t| t.cached).count(),
        }
    }

    /// Forget everything except the configured limits.
    pub fn clear(&mut self) {
        *self = Self::with_limits(self.history_limit, self.cache_ttl, self.cache_capacity);
    }
}

/// Cache key: lower-cased, trimmed question.
pub fn cache_key(question: &str) -> String {
    question.trim().to_lowercase()
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

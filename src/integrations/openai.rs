//! OpenAI chat completions client used to generate answers.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{validate_openai_key, OpenAiSettings};
use crate::{Error, Result};

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create client from the OpenAI settings.
    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self> {
        validate_openai_key(&settings.api_key, &settings.base_url)?;

        let timeout = Duration::from_secs(settings.timeout_secs);
        let http = Client::builder()
            .user_agent(concat!("lawchat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::GenerationServiceError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key: settings.api_key.trim().to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.chat_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion, returning the first choice's text.
    pub async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Requesting completion from {} ({} messages)",
            self.model,
            request.messages.len()
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::GenerationServiceError(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    Error::GenerationServiceError(format!("OpenAI request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            Error::GenerationServiceError(format!("Failed to read response: {}", e))
        })?;

        if !status.is_success() {
            return Err(Error::GenerationServiceError(format!(
                "OpenAI error {}: {}",
                status,
                api_error_message(&text)
            )));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::GenerationServiceError(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::GenerationServiceError("Empty response from OpenAI".to_string()))
    }
}

/// Pull the provider's message out of an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Wrapped {
        error: ApiError,
    }
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    serde_json::from_str::<Wrapped>(body)
        .map(|w| w.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

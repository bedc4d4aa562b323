/*!
 * Provider implementations for the text-generation services.
 *
 * This module contains the provider contract used by every pipeline stage
 * and client implementations for various LLM providers:
 * - Ollama: Local LLM server (JSON-capable)
 * - OpenAI: OpenAI API and compatible servers such as LM Studio (JSON-capable)
 * - Anthropic: Anthropic API (text only)
 *
 * Whether a provider can return structured JSON is part of its type:
 * a `ProviderHandle` is either `TextOnly` or `JsonCapable`, decided once when
 * the handle is built.
 */

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::errors::ProviderError;

pub mod anthropic;
pub mod cache;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use cache::ProviderCache;
pub use factory::{ConfigProviderFactory, ProviderFactory};

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions
    System,
    /// Request content
    User,
    /// Model output
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: ChatRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options for a completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Temperature for generation
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Create options with a temperature and output budget.
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }
}

/// Free-text completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text
    pub content: String,
    /// Tokens consumed by the call (prompt + completion)
    pub tokens_used: u64,
}

/// Structured completion
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCompletion<T = serde_json::Value> {
    /// Parsed JSON payload
    pub data: T,
    /// Tokens consumed by the call (prompt + completion)
    pub tokens_used: u64,
}

/// A provider that turns chat messages into text.
#[async_trait]
pub trait TextProvider: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Complete a conversation
    ///
    /// # Arguments
    /// * `messages` - The conversation so far
    /// * `options` - Sampling options
    ///
    /// # Returns
    /// * `Result<Completion, ProviderError>` - The generated text or an error
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;
}

/// A provider that can also return a JSON object.
#[async_trait]
pub trait JsonProvider: TextProvider {
    /// Complete a conversation, requiring a single JSON object as output
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<JsonCompletion, ProviderError>;
}

/// A provider together with its capability.
#[derive(Debug, Clone)]
pub enum ProviderHandle {
    /// Free text only
    TextOnly(Arc<dyn TextProvider>),
    /// Free text and structured JSON
    JsonCapable(Arc<dyn JsonProvider>),
}

impl ProviderHandle {
    /// Wrap a text-only provider.
    pub fn text_only<P: TextProvider + 'static>(provider: P) -> Self {
        Self::TextOnly(Arc::new(provider))
    }

    /// Wrap a JSON-capable provider.
    pub fn json_capable<P: JsonProvider + 'static>(provider: P) -> Self {
        Self::JsonCapable(Arc::new(provider))
    }

    /// Provider name for logs.
    pub fn name(&self) -> &str {
        match self {
            Self::TextOnly(p) => p.name(),
            Self::JsonCapable(p) => p.name(),
        }
    }

    /// Whether structured output is available.
    pub fn supports_json(&self) -> bool {
        matches!(self, Self::JsonCapable(_))
    }

    /// Free-text completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        match self {
            Self::TextOnly(p) => p.complete(messages, options).await,
            Self::JsonCapable(p) => p.complete(messages, options).await,
        }
    }

    /// Structured completion; fails with `Unsupported` on a text-only provider.
    pub async fn complete_json(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<JsonCompletion, ProviderError> {
        match self {
            Self::TextOnly(p) => Err(ProviderError::Unsupported(format!(
                "{} cannot produce structured output",
                p.name()
            ))),
            Self::JsonCapable(p) => p.complete_json(messages, options).await,
        }
    }

    /// Structured completion deserialized into `T`.
    pub async fn complete_json_as<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<JsonCompletion<T>, ProviderError> {
        let completion = self.complete_json(messages, options).await?;
        let data = serde_json::from_value(completion.data)
            .map_err(|e| ProviderError::ParseError(format!("Unexpected JSON shape: {}", e)))?;

        Ok(JsonCompletion {
            data,
            tokens_used: completion.tokens_used,
        })
    }
}

/// One provider per pipeline stage.
#[derive(Debug, Clone)]
pub struct StageProviders {
    /// Provider for the analysis stage
    pub analyze: ProviderHandle,
    /// Provider for the translation stage
    pub translate: ProviderHandle,
    /// Provider for the editing stage
    pub edit: ProviderHandle,
}

impl StageProviders {
    /// Use the same provider for every stage.
    pub fn uniform(handle: ProviderHandle) -> Self {
        Self {
            analyze: handle.clone(),
            translate: handle.clone(),
            edit: handle,
        }
    }
}

/// Extract a JSON object from a possibly wrapped model response.
///
/// Handles raw JSON, fenced code blocks and JSON embedded in prose.
pub fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') {
        return Some(trimmed.to_string());
    }

    // Look for JSON block in markdown code fence
    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return Some(trimmed[start + 7..start + 7 + end].trim().to_string());
        }
    }

    // Look for JSON block without language specifier
    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let json = trimmed[start + 3..start + 3 + end].trim();
            if json.starts_with('{') {
                return Some(json.to_string());
            }
        }
    }

    // Look for first { and last }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return Some(trimmed[start..=end].to_string());
        }
    }

    None
}

/// Parse model output into a JSON value.
pub fn parse_json_content(content: &str) -> Result<serde_json::Value, ProviderError> {
    let json = extract_json(content)
        .ok_or_else(|| ProviderError::ParseError("No JSON object in response".to_string()))?;

    serde_json::from_str(&json).map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Map an unsuccessful HTTP status to a provider error.
pub fn error_for_status(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError {
            status_code,
            message,
        },
    }
}

/// Retry, backoff and pacing shared by the HTTP clients
#[derive(Debug)]
pub struct RequestPolicy {
    /// Retries after the first attempt
    max_retries: u32,
    /// Base backoff, doubled on each retry
    backoff_base_ms: u64,
    /// Minimum spacing between requests derived from a requests-per-minute limit
    min_interval: Option<Duration>,
    /// Time of the last request
    last_request: Mutex<Option<Instant>>,
}

impl RequestPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, backoff_base_ms: u64, rate_limit: Option<u32>) -> Self {
        let min_interval = rate_limit
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64));

        Self {
            max_retries,
            backoff_base_ms,
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Whether an error is worth retrying.
    pub fn is_retryable(error: &ProviderError) -> bool {
        match error {
            ProviderError::ConnectionError(_)
            | ProviderError::RequestFailed(_)
            | ProviderError::RateLimitExceeded(_) => true,
            ProviderError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    async fn pace(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Delay before retry number `tries` (1-based), doubling each time.
    pub fn backoff_for(&self, tries: u32) -> Duration {
        let factor = 1u64 << tries.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Run `attempt` with pacing, retrying retryable errors with exponential backoff.
    pub async fn run<F, Fut, T>(&self, provider: &str, mut attempt: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut tries = 0u32;

        loop {
            self.pace().await;

            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if Self::is_retryable(&e) && tries < self.max_retries => {
                    tries += 1;
                    let backoff = self.backoff_for(tries);
                    warn!(
                        "{} request failed: {} - retry {}/{} in {}ms",
                        provider,
                        e,
                        tries,
                        self.max_retries,
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(3, 1000, None)
    }
}

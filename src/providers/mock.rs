/*!
 * Mock provider implementations for testing.
 *
 * This module provides a deterministic provider that simulates different behaviors:
 * - `MockProvider::working()` - "Translates" every paragraph, keeping markers
 * - `MockProvider::dropping_markers()` - Translates but loses the paragraph markers
 * - `MockProvider::malformed_json()` - Free text works, JSON mode returns garbage
 * - `MockProvider::intermittent(n)` - Fails every n-th request
 * - `MockProvider::failing()` - Always fails with an error
 *
 * The mock reads the framed payload of the last user message, so the same
 * instance can serve the analyze, translate and edit stages.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{
    parse_json_content, ChatMessage, ChatRole, Completion, CompletionOptions, JsonCompletion,
    JsonProvider, TextProvider,
};
use crate::translation::document::{estimate_tokens, is_separator, split_paragraphs};
use crate::translation::markers::{marker_for, MarkerTagger};
use crate::translation::prompts::extract_payload;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Always succeeds, preserving paragraph markers
    Working,
    /// Succeeds but strips every paragraph marker from the output
    DropMarkers,
    /// Succeeds but keeps only the first paragraph marker of each reply
    KeepFirstMarker,
    /// Free text succeeds; JSON mode returns unparseable content
    MalformedJson,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for cancellation testing)
    Slow { delay_ms: u64 },
}

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Messages of the request
    pub messages: Vec<ChatMessage>,
    /// Whether JSON mode was requested
    pub json: bool,
}

impl MockCall {
    /// Content of the last user message
    pub fn user_prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map_or("", |m| m.content.as_str())
    }
}

/// Mock provider for testing pipeline behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Prefix marking a paragraph as translated
    prefix: String,
    /// Exact-text translations that take precedence over the prefix
    dictionary: HashMap<String, String>,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Recorded requests, shared between clones
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            prefix: "[TRANSLATED] ".to_string(),
            dictionary: HashMap::new(),
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that loses paragraph markers
    pub fn dropping_markers() -> Self {
        Self::new(MockBehavior::DropMarkers)
    }

    /// Create a mock that keeps the first marker of a reply and drops the rest
    pub fn keeping_first_marker() -> Self {
        Self::new(MockBehavior::KeepFirstMarker)
    }

    /// Create a mock whose JSON mode returns garbage
    pub fn malformed_json() -> Self {
        Self::new(MockBehavior::MalformedJson)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that waits before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set the prefix added to translated paragraphs
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Add exact-text translations
    pub fn with_translations(mut self, pairs: &[(&str, &str)]) -> Self {
        for (source, target) in pairs {
            self.dictionary.insert(source.to_string(), target.to_string());
        }
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    fn translate_paragraph(&self, text: &str) -> String {
        let text = text.trim();
        if let Some(target) = self.dictionary.get(text) {
            return target.clone();
        }
        if is_separator(text) || self.dictionary.values().any(|v| v == text) {
            return text.to_string();
        }
        if self.prefix.is_empty() || text.starts_with(&self.prefix) {
            return text.to_string();
        }
        format!("{}{}", self.prefix, text)
    }

    /// Translate a payload, optionally keeping its markers
    fn render(&self, payload: &str, keep_markers: bool) -> String {
        let pairs = MarkerTagger::split_tagged(payload);

        if pairs.is_empty() {
            return split_paragraphs(payload)
                .into_iter()
                .map(|p| self.translate_paragraph(p))
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        // Continuation chunks open with the tail of an earlier paragraph
        let leading = payload
            .find(&marker_for(&pairs[0].0))
            .map_or("", |position| payload[..position].trim());

        let mut blocks: Vec<String> = split_paragraphs(leading)
            .into_iter()
            .map(|p| self.translate_paragraph(p))
            .collect();

        let keep_only_first = self.behavior == MockBehavior::KeepFirstMarker;
        blocks.extend(pairs.iter().enumerate().map(|(position, (id, text))| {
            let translated = self.translate_paragraph(text);
            if keep_markers && (position == 0 || !keep_only_first) {
                format!("{}{}", marker_for(id), translated)
            } else {
                translated
            }
        }));

        blocks.join("\n\n")
    }

    /// Union object accepted by every stage's response schema
    fn render_json(&self, payload: &str) -> serde_json::Value {
        let pairs = if self.behavior == MockBehavior::DropMarkers {
            Vec::new()
        } else {
            MarkerTagger::split_tagged(payload)
        };

        let paragraphs: Vec<serde_json::Value> = pairs
            .iter()
            .map(|(id, text)| json!({"id": marker_for(id), "translated": self.translate_paragraph(text)}))
            .collect();

        json!({
            "paragraphs": paragraphs,
            "edited": self.render(payload, self.behavior != MockBehavior::DropMarkers),
            "changes": [],
            "quality_score": 0.9,
            "characters": [],
            "terms": [],
            "style": "neutral narration",
            "summary": format!("Excerpt of {} paragraph(s).", split_paragraphs(payload).len()),
        })
    }

    /// Count, record and apply the failure modes shared by both completion kinds
    async fn begin(&self, messages: &[ChatMessage], json: bool) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(MockCall {
            messages: messages.to_vec(),
            json,
        });

        match self.behavior {
            MockBehavior::Failing => {
                return Err(ProviderError::ApiError {
                    message: "Simulated provider failure".to_string(),
                    status_code: 500,
                });
            }
            MockBehavior::Intermittent { fail_every } if count % fail_every == fail_every - 1 => {
                return Err(ProviderError::ApiError {
                    message: format!("Simulated intermittent failure (request #{})", count + 1),
                    status_code: 503,
                });
            }
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            _ => {}
        }

        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map_or("", |m| m.content.as_str());

        Ok(extract_payload(prompt).unwrap_or(prompt).to_string())
    }

    fn tokens_for(messages: &[ChatMessage], output: &str) -> u64 {
        let prompt: usize = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        (prompt + estimate_tokens(output)) as u64
    }
}

#[async_trait]
impl TextProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let payload = self.begin(messages, false).await?;

        let content = match self.behavior {
            MockBehavior::Empty => String::new(),
            MockBehavior::DropMarkers => self.render(&payload, false),
            _ => self.render(&payload, true),
        };

        Ok(Completion {
            tokens_used: Self::tokens_for(messages, &content),
            content,
        })
    }
}

#[async_trait]
impl JsonProvider for MockProvider {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<JsonCompletion, ProviderError> {
        let payload = self.begin(messages, true).await?;

        let content = match self.behavior {
            MockBehavior::Empty => "{}".to_string(),
            MockBehavior::MalformedJson => "Sure! Here is the translation you asked for.".to_string(),
            _ => self.render_json(&payload).to_string(),
        };

        Ok(JsonCompletion {
            data: parse_json_content(&content)?,
            tokens_used: Self::tokens_for(messages, &content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::prompts::wrap_payload;

    fn request(text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Translate."),
            ChatMessage::user(format!("Please:\n{}", wrap_payload(text))),
        ]
    }

    #[tokio::test]
    async fn test_workingProvider_shouldKeepMarkers() {
        let provider = MockProvider::working();

        let response = provider
            .complete(&request("--para:a--Hello.\n\n--para:b--***"), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "--para:a--[TRANSLATED] Hello.\n\n--para:b--***");
        assert!(response.tokens_used > 0);
    }

    #[tokio::test]
    async fn test_workingProvider_shouldKeepTextBeforeFirstMarker() {
        let provider = MockProvider::working();

        let response = provider
            .complete(&request("tail of it.\n\n--para:b--Next."), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "[TRANSLATED] tail of it.\n\n--para:b--[TRANSLATED] Next.");
    }

    #[tokio::test]
    async fn test_keepingFirstMarker_shouldDropLaterMarkers() {
        let provider = MockProvider::keeping_first_marker();

        let response = provider
            .complete(&request("--para:a--Hello.\n\n--para:b--World."), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "--para:a--[TRANSLATED] Hello.\n\n[TRANSLATED] World.");
    }

    #[tokio::test]
    async fn test_dictionary_shouldTakePrecedence() {
        let provider = MockProvider::working().with_translations(&[("Hello.", "Привет.")]);

        let response = provider
            .complete(&request("Hello.\n\nWorld."), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "Привет.\n\n[TRANSLATED] World.");
    }

    #[tokio::test]
    async fn test_translation_shouldBeIdempotent() {
        let provider = MockProvider::working();

        let response = provider
            .complete(&request("[TRANSLATED] Hello."), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "[TRANSLATED] Hello.");
    }

    #[tokio::test]
    async fn test_completeJson_shouldReturnParagraphEntries() {
        let provider = MockProvider::working();

        let response = provider
            .complete_json(&request("--para:a--Hello."), &CompletionOptions::default())
            .await
            .unwrap();

        assert_eq!(response.data["paragraphs"][0]["id"], "--para:a--");
        assert_eq!(response.data["paragraphs"][0]["translated"], "[TRANSLATED] Hello.");
    }

    #[tokio::test]
    async fn test_malformedJson_shouldFailOnlyInJsonMode() {
        let provider = MockProvider::malformed_json();

        assert!(provider.complete(&request("Hi."), &CompletionOptions::default()).await.is_ok());
        assert!(matches!(
            provider.complete_json(&request("Hi."), &CompletionOptions::default()).await,
            Err(ProviderError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_intermittentProvider_shouldFailPeriodically() {
        let provider = MockProvider::intermittent(3);
        let options = CompletionOptions::default();

        assert!(provider.complete(&request("A."), &options).await.is_ok());
        assert!(provider.complete(&request("A."), &options).await.is_ok());
        assert!(provider.complete(&request("A."), &options).await.is_err());
        assert!(provider.complete(&request("A."), &options).await.is_ok());
    }

    #[tokio::test]
    async fn test_clonedProvider_shouldShareCallLog() {
        let provider = MockProvider::working();
        let cloned = provider.clone();

        cloned.complete(&request("A."), &CompletionOptions::default()).await.unwrap();

        assert_eq!(provider.request_count(), 1);
        assert_eq!(provider.calls().len(), 1);
        assert!(!provider.calls()[0].json);
        assert!(provider.calls()[0].user_prompt().contains("A."));
    }
}

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    error_for_status, ChatMessage, ChatRole, Completion, CompletionOptions, RequestPolicy,
    TextProvider,
};
use crate::errors::ProviderError;

/// Client for the Anthropic messages API
///
/// The messages API has no JSON mode, so this provider is text-only.
#[derive(Debug)]
pub struct Anthropic {
    client: Client,
    api_key: String,
    /// Base URL; empty means the public API
    endpoint: String,
    model: String,
    /// Retry and rate limit handling
    policy: RequestPolicy,
}

/// Body of `POST /v1/messages`
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    model: String,

    /// User and assistant turns only
    messages: Vec<AnthropicMessage>,

    /// System messages, joined
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Required by the API
    max_tokens: u32,
}

/// One conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

/// Billed tokens of a response
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response of `POST /v1/messages`
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicContent>,
    pub usage: TokenUsage,
}

/// Content block; only `text` blocks carry output
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    #[serde(rename = "type")]
    pub content_type: String,

    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Build a request from chat messages.
    ///
    /// System messages are lifted into the top-level `system` field.
    pub fn from_messages(model: &str, messages: &[ChatMessage], options: &CompletionOptions) -> Self {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        Self {
            model: model.to_string(),
            messages: messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .map(|m| AnthropicMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: options.temperature,
            max_tokens: options.max_tokens.unwrap_or(4096),
        }
    }
}

impl AnthropicResponse {
    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

impl Anthropic {
    /// Create a client; `endpoint` may be empty
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        policy: RequestPolicy,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            policy,
        }
    }

    fn api_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.anthropic.com/v1/messages".to_string()
        } else {
            format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
        }
    }

    /// Send a messages request
    async fn send(&self, request: &AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let api_url = self.api_url();

        self.policy
            .run("Anthropic", || async {
                let response = self
                    .client
                    .post(&api_url)
                    .header("Content-Type", "application/json")
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(request)
                    .send()
                    .await
                    .map_err(|e| {
                        ProviderError::ConnectionError(format!(
                            "Failed to send request to Anthropic API: {}",
                            e
                        ))
                    })?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    error!("Anthropic API error ({}): {}", status, error_text);
                    return Err(error_for_status(status.as_u16(), error_text));
                }

                response.json::<AnthropicResponse>().await.map_err(|e| {
                    ProviderError::ParseError(format!("Failed to parse Anthropic API response: {}", e))
                })
            })
            .await
    }
}

#[async_trait]
impl TextProvider for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let request = AnthropicRequest::from_messages(&self.model, messages, options);
        let response = self.send(&request).await?;

        Ok(Completion {
            content: response.text(),
            tokens_used: (response.usage.input_tokens + response.usage.output_tokens) as u64,
        })
    }
}

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    error_for_status, parse_json_content, ChatMessage, Completion, CompletionOptions,
    JsonCompletion, JsonProvider, RequestPolicy, TextProvider,
};
use crate::errors::ProviderError;

/// Client for the OpenAI chat completions API and compatible servers (LM Studio)
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key; empty for local servers
    api_key: String,
    /// Base URL including the version prefix, e.g. `https://api.openai.com/v1`
    endpoint: String,
    /// Model name
    model: String,
    /// Short name for logs
    label: &'static str,
    /// Retry and rate limit handling
    policy: RequestPolicy,
}

/// Requested response format
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Chat completions request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl ChatResponse {
    fn into_completion(self) -> Completion {
        let tokens_used = self.usage.map_or(0, |u| u.total_tokens);
        let content = self
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();

        Completion {
            content,
            tokens_used,
        }
    }
}

impl OpenAI {
    /// Create a client for the OpenAI API
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        policy: RequestPolicy,
    ) -> Self {
        Self::with_label("openai", api_key, endpoint, model, timeout_secs, policy)
    }

    /// Create a client for a local LM Studio server
    pub fn lm_studio(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        policy: RequestPolicy,
    ) -> Self {
        Self::with_label("lmstudio", String::new(), endpoint, model, timeout_secs, policy)
    }

    fn with_label(
        label: &'static str,
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
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            label,
            policy,
        }
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        json_mode: bool,
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);

        self.policy
            .run(self.label, || async {
                let body = ChatRequest {
                    model: &self.model,
                    messages,
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                    response_format: json_mode.then_some(ResponseFormat {
                        format_type: "json_object",
                    }),
                };

                let mut request = self.client.post(&url).json(&body);
                if !self.api_key.trim().is_empty() {
                    request = request.bearer_auth(self.api_key.trim());
                }

                let response = request.send().await.map_err(|e| {
                    ProviderError::ConnectionError(format!(
                        "Failed to call {} chat completions: {}",
                        self.label, e
                    ))
                })?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    error!("{} API error ({}): {}", self.label, status, error_text);
                    return Err(error_for_status(status.as_u16(), error_text));
                }

                let parsed: ChatResponse = response.json().await.map_err(|e| {
                    ProviderError::ParseError(format!("Failed to parse {} response: {}", self.label, e))
                })?;

                Ok(parsed.into_completion())
            })
            .await
    }
}

#[async_trait]
impl TextProvider for OpenAI {
    fn name(&self) -> &str {
        self.label
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.chat(messages, options, false).await
    }
}

#[async_trait]
impl JsonProvider for OpenAI {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<JsonCompletion, ProviderError> {
        let completion = self.chat(messages, options, true).await?;
        Ok(JsonCompletion {
            data: parse_json_content(&completion.content)?,
            tokens_used: completion.tokens_used,
        })
    }
}

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    error_for_status, parse_json_content, ChatMessage, Completion, CompletionOptions,
    JsonCompletion, JsonProvider, RequestPolicy, TextProvider,
};
use crate::errors::ProviderError;

/// Client for a local Ollama server's chat endpoint
#[derive(Debug)]
pub struct Ollama {
    base_url: String,
    model: String,
    client: Client,
    /// Retry and rate limit handling
    policy: RequestPolicy,
}

/// Sampling settings sent as `options`
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Output token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Body of `POST /api/chat`
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// `"json"` turns on JSON mode
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    /// Always false; one response per request
    stream: bool,
}

/// Message in a chat response
#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    /// Role of the sender
    #[serde(default)]
    pub role: String,
    /// Generated content
    #[serde(default)]
    pub content: String,
}

/// Non-streamed reply of `/api/chat`
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    pub message: ResponseMessage,
    #[serde(default)]
    pub done: bool,
    /// Token counts, absent on some server versions
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl ChatResponse {
    fn tokens_used(&self) -> u64 {
        self.prompt_eval_count.unwrap_or(0) + self.eval_count.unwrap_or(0)
    }
}

impl Ollama {
    /// Client for `endpoint` (scheme optional, e.g. `localhost:11434`)
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        policy: RequestPolicy,
    ) -> Self {
        let endpoint = endpoint.into();
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };

        Self {
            base_url,
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Ollama only speaks HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat with the Ollama API, retrying transient failures
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        json_mode: bool,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        self.policy
            .run("Ollama", || async {
                let request = ChatRequest {
                    model: &self.model,
                    messages,
                    options: Some(GenerationOptions {
                        temperature: options.temperature,
                        num_predict: options.max_tokens,
                    }),
                    format: json_mode.then_some("json"),
                    stream: false,
                };

                let response = self
                    .client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| {
                        ProviderError::ConnectionError(format!(
                            "Failed to send request to Ollama API: {}",
                            e
                        ))
                    })?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    error!("Ollama API error ({}): {}", status, error_text);
                    return Err(error_for_status(status.as_u16(), error_text));
                }

                let response_text = response.text().await.map_err(|e| {
                    ProviderError::RequestFailed(format!(
                        "Failed to get response text from Ollama API: {}",
                        e
                    ))
                })?;

                parse_chat_response(&response_text)
            })
            .await
    }

    /// Server version, handy as a reachability check
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to connect to Ollama: {}", e)))?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Invalid version response: {}", e)))?;

        response["version"]
            .as_str()
            .map(|v| v.to_string())
            .ok_or_else(|| ProviderError::ParseError("Invalid version format in response".to_string()))
    }
}

/// Parse a chat response, accepting streamed JSONL as well as a single object
fn parse_chat_response(response_text: &str) -> Result<ChatResponse, ProviderError> {
    if let Ok(chat_response) = serde_json::from_str::<ChatResponse>(response_text) {
        return Ok(chat_response);
    }

    // The server may have streamed despite `stream: false`; concatenate the pieces
    let parts: Vec<ChatResponse> = response_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<ChatResponse>(line).ok())
        .collect();

    let Some(last) = parts.last() else {
        let preview: String = response_text.chars().take(500).collect();
        error!("Failed to parse Ollama API chat response. Raw response (first 500 chars): {}", preview);
        return Err(ProviderError::ParseError(
            "Failed to parse Ollama API chat response".to_string(),
        ));
    };

    debug!("Reassembled streamed Ollama response from {} parts", parts.len());

    Ok(ChatResponse {
        model: last.model.clone(),
        message: ResponseMessage {
            role: "assistant".to_string(),
            content: parts.iter().map(|p| p.message.content.as_str()).collect(),
        },
        done: true,
        prompt_eval_count: last.prompt_eval_count,
        eval_count: last.eval_count,
    })
}

#[async_trait]
impl TextProvider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let response = self.chat(messages, options, false).await?;
        Ok(Completion {
            tokens_used: response.tokens_used(),
            content: response.message.content,
        })
    }
}

#[async_trait]
impl JsonProvider for Ollama {
    async fn complete_json(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<JsonCompletion, ProviderError> {
        let response = self.chat(messages, options, true).await?;
        Ok(JsonCompletion {
            data: parse_json_content(&response.message.content)?,
            tokens_used: response.tokens_used(),
        })
    }
}

//! OpenAI-compatible streaming provider
//!
//! Works with any API that implements the OpenAI chat completions format in
//! streaming mode:
//! - OpenAI (api.openai.com)
//! - Groq (api.groq.com)
//! - vLLM, LM Studio, LocalAI and other local servers
//!
//! # Configuration
//!
//! ```text
//! MENTOR_PROVIDER=openai          # or groq, local
//! OPENAI_API_KEY=sk-...
//! MENTOR_BASE_URL=http://localhost:8000/v1   # optional override, required for local
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conversation::Message;

use super::sse::{SseEvent, SseLineBuffer};
use super::{CompletionChunk, CompletionProvider, CompletionStream, ProviderError};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// One `data:` payload of a streamed completion
#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Name reported in logs
    pub name: String,
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional cap on generated tokens
    pub max_tokens: Option<u32>,
    /// TCP connect timeout in seconds. Response time is bounded by the caller.
    pub connect_timeout_secs: u64,
}

impl OpenAICompatConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some(api_key.into()),
            temperature: 0.1,
            max_tokens: None,
            connect_timeout_secs: 10,
        }
    }

    /// Create config for Groq
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            name: "groq".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            ..Self::openai(api_key)
        }
    }

    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            name: "local".to_string(),
            base_url: base_url.into(),
            api_key: None,
            temperature: 0.1,
            max_tokens: None,
            connect_timeout_secs: 10,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<CompletionStream, ProviderError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let mut req_builder = self.client.post(self.chat_url());

        // Add authorization if API key is provided
        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        debug!(provider = %self.config.name, model, "completion stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = SseLineBuffer::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ProviderError::RequestFailed(e));
                        return;
                    }
                };

                for event in buffer.feed(&chunk) {
                    match event {
                        SseEvent::Done => return,
                        SseEvent::Data(data) => match parse_stream_data(&data) {
                            Ok(Some(chunk)) => yield Ok(chunk),
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        },
                    }
                }
            }

            if let Some(SseEvent::Data(data)) = buffer.flush() {
                match parse_stream_data(&data) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Turn an error body into a readable message, preferring the API's own text
fn error_from_body(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(body) {
        return ProviderError::InvalidResponse(format!(
            "API error ({}): {}",
            status, error_resp.error.message
        ));
    }
    ProviderError::InvalidResponse(format!("HTTP {}: {}", status, body))
}

/// Parse one `data:` payload.
///
/// Returns `Ok(None)` for payloads with nothing to relay (role-only deltas,
/// usage frames) and for lines that are not valid JSON, which are skipped.
fn parse_stream_data(data: &str) -> Result<Option<CompletionChunk>, ProviderError> {
    let payload: StreamPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Skipping malformed stream chunk: {}", e);
            return Ok(None);
        }
    };

    if let Some(error) = payload.error {
        return Err(ProviderError::InvalidResponse(format!(
            "API error: {}",
            error.message
        )));
    }

    let Some(choice) = payload.choices.into_iter().next() else {
        return Ok(None);
    };

    let content = choice.delta.content.filter(|c| !c.is_empty());
    if content.is_none() && choice.finish_reason.is_none() {
        return Ok(None);
    }

    Ok(Some(CompletionChunk {
        content,
        finish_reason: choice.finish_reason,
        model: payload.model,
    }))
}

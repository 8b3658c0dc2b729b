//! Completion provider integrations

pub mod openai_compat;
#[cfg(test)]
pub mod scripted;
mod sse;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::config::ProviderSettings;
use crate::conversation::Message;

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?} waiting for the completion provider")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ProviderError::Timeout(_) => true,
            ProviderError::RequestFailed(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// One parsed piece of a streamed completion.
///
/// Providers omit fields freely, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionChunk {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
}

impl CompletionChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, ProviderError>> + Send>>;

/// A hosted chat-completion service that can stream its output
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start a streaming completion. Returns once the provider has accepted the
    /// request; chunks arrive on the returned stream.
    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<CompletionStream, ProviderError>;
}

/// Build the configured provider
pub fn from_settings(
    settings: &ProviderSettings,
) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
    let config = match settings.name.to_lowercase().as_str() {
        "openai" => OpenAICompatConfig::openai(require_key(settings)?),
        "groq" => OpenAICompatConfig::groq(require_key(settings)?),
        "local" => {
            let base_url = settings.base_url.clone().ok_or_else(|| {
                ProviderError::NotConfigured("local provider needs MENTOR_BASE_URL".into())
            })?;
            OpenAICompatConfig::local(base_url)
        }
        other => return Err(ProviderError::UnknownProvider(other.to_string())),
    };

    let config = match &settings.base_url {
        Some(url) => config.with_base_url(url.clone()),
        None => config,
    };

    Ok(Arc::new(OpenAICompatProvider::new(config)?))
}

fn require_key(settings: &ProviderSettings) -> Result<String, ProviderError> {
    settings
        .api_key
        .clone()
        .ok_or_else(|| ProviderError::NotConfigured(format!("{} API key", settings.name)))
}

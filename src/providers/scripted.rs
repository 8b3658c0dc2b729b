//! In-process provider that replays a fixed script, for tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::conversation::Message;

use super::{CompletionChunk, CompletionProvider, CompletionStream, ProviderError};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub model: String,
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    fragments: Vec<String>,
    fail_after: Option<String>,
    refuse: Option<String>,
    stall: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Fail with this message after the scripted fragments
    pub fn failing_with(mut self, message: &str) -> Self {
        self.fail_after = Some(message.to_string());
        self
    }

    /// Reject the request before streaming anything
    pub fn refusing(mut self, message: &str) -> Self {
        self.refuse = Some(message.to_string());
        self
    }

    /// Hang forever after the scripted fragments
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Sleep before each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<CompletionStream, ProviderError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            model: model.to_string(),
        });

        if let Some(ref message) = self.refuse {
            return Err(ProviderError::InvalidResponse(message.clone()));
        }

        let fragments = self.fragments.clone();
        let fail_after = self.fail_after.clone();
        let stall = self.stall;
        let delay = self.delay;

        let stream = async_stream::stream! {
            for fragment in fragments {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(CompletionChunk::text(fragment));
            }
            if let Some(message) = fail_after {
                yield Err(ProviderError::InvalidResponse(message));
                return;
            }
            if stall {
                std::future::pending::<()>().await;
            }
        };

        Ok(Box::pin(stream))
    }
}

//! Streaming relay between the completion provider and the caller
//!
//! The responder runs as the producer half of a bounded channel. Every chunk the
//! provider emits is forwarded immediately; the transport on the other end
//! writes each fragment out as it arrives. When the consumer goes away, or stops
//! reading for longer than the timeout, the send fails, the responder stops
//! pulling from the provider, and the exchange is reported as cancelled with
//! whatever was delivered so far.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::conversation::Message;
use crate::providers::{CompletionProvider, ProviderError};

use super::selector::ModelTier;

/// Default capacity of the relay channel. Small on purpose: fragments should
/// reach the caller as they are produced, not pile up.
pub const FRAGMENT_BUFFER: usize = 8;

/// One piece of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Generated text
    Text(String),
    /// Terminal failure notice; always the last fragment of its stream
    Error(String),
}

impl Fragment {
    pub fn error(err: &ProviderError) -> Self {
        Fragment::Error(format!("Error: {}", err))
    }

    /// Text as written to a plain-text transport
    pub fn as_text(&self) -> &str {
        match self {
            Fragment::Text(text) | Fragment::Error(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Fragment::Text(text) | Fragment::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Fragment::Error(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Completed,
    Failed,
    Cancelled,
}

/// What a finished exchange produced
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    /// Every fragment delivered, concatenated, including an error notice if any
    pub answer: String,
    pub tier: ModelTier,
    pub model: String,
    pub status: ExchangeStatus,
}

/// Receiving half of an exchange: a finite, non-restartable fragment sequence.
///
/// Dropping it tells the producer to stop.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<Fragment>,
}

impl FragmentStream {
    pub fn channel(buffer: usize) -> (FragmentSink, FragmentStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (FragmentSink { tx }, FragmentStream { rx })
    }
}

impl Stream for FragmentStream {
    type Item = Fragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Fragment>> {
        self.rx.poll_recv(cx)
    }
}

/// Sending half of an exchange
#[derive(Debug)]
pub struct FragmentSink {
    tx: mpsc::Sender<Fragment>,
}

impl FragmentSink {
    /// Returns false once the consumer has gone away or has not made room
    /// within `wait`
    async fn send(&self, fragment: Fragment, wait: Duration) -> bool {
        matches!(
            tokio::time::timeout(wait, self.tx.send(fragment)).await,
            Ok(Ok(()))
        )
    }
}

pub struct StreamingResponder {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl StreamingResponder {
    /// `timeout` bounds the initial provider call and every wait for the next chunk
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Stream a completion of `messages` into `sink` and report the outcome.
    pub async fn respond(
        &self,
        messages: &[Message],
        tier: ModelTier,
        model: &str,
        sink: FragmentSink,
    ) -> ExchangeOutcome {
        let mut answer = String::new();
        let status = self.relay(messages, model, &sink, &mut answer).await;

        debug!(
            provider = self.provider.name(),
            model,
            ?status,
            chars = answer.chars().count(),
            "exchange finished"
        );

        ExchangeOutcome {
            answer,
            tier,
            model: model.to_string(),
            status,
        }
    }

    async fn relay(
        &self,
        messages: &[Message],
        model: &str,
        sink: &FragmentSink,
        answer: &mut String,
    ) -> ExchangeStatus {
        let opened = tokio::time::timeout(self.timeout, self.provider.stream_chat(messages, model))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.timeout)));

        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => return self.fail(e, sink, answer).await,
        };

        loop {
            let next = match tokio::time::timeout(self.timeout, chunks.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(ProviderError::Timeout(self.timeout))),
            };

            match next {
                None => return ExchangeStatus::Completed,
                Some(Ok(chunk)) => {
                    if let Some(reason) = chunk.finish_reason.as_deref() {
                        debug!(
                            reason,
                            model = chunk.model.as_deref().unwrap_or(model),
                            "provider finished"
                        );
                    }
                    let Some(content) = chunk.content else {
                        continue;
                    };
                    trace!(len = content.len(), "fragment");
                    let delivered = answer.len();
                    answer.push_str(&content);
                    if !sink.send(Fragment::Text(content), self.timeout).await {
                        answer.truncate(delivered);
                        debug!("consumer dropped or stopped reading the stream, stopping");
                        return ExchangeStatus::Cancelled;
                    }
                }
                Some(Err(e)) => return self.fail(e, sink, answer).await,
            }
        }
    }

    async fn fail(
        &self,
        err: ProviderError,
        sink: &FragmentSink,
        answer: &mut String,
    ) -> ExchangeStatus {
        warn!(
            provider = self.provider.name(),
            timeout = err.is_timeout(),
            "completion failed: {}",
            err
        );

        let fragment = Fragment::error(&err);
        let notice = fragment.as_text().to_string();
        if sink.send(fragment, self.timeout).await {
            answer.push_str(&notice);
            ExchangeStatus::Failed
        } else {
            ExchangeStatus::Cancelled
        }
    }
}

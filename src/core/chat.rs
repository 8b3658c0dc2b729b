//! Chat engine orchestrating one exchange
//!
//! For every user message the ChatEngine:
//! 1. Takes exclusive hold of the conversation thread
//! 2. Appends the user message to the thread history
//! 3. Classifies the message, composes the system prompt, and picks a tier
//! 4. Streams the completion back through a fragment channel
//! 5. Writes the assistant turn back to the thread and releases it
//! 6. Records the exchange in the chat log

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::conversation::{Message, SessionError, SessionStore, TurnState};

use super::chat_log::{ChatLog, ChatRecord};
use super::classifier::{classify, Classification};
use super::composer::compose;
use super::responder::{
    ExchangeOutcome, ExchangeStatus, FragmentStream, StreamingResponder, FRAGMENT_BUFFER,
};
use super::selector::{select, ModelTier, TierModels};

/// Sender recorded when the caller does not identify itself
pub const ANONYMOUS_SENDER: &str = "anonymous";

/// One incoming user message
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub message: String,
    pub sender: String,
    /// Conversation to continue; a new one is started when absent
    pub thread_id: Option<String>,
}

/// A running exchange, handed to the transport
#[derive(Debug)]
pub struct Exchange {
    pub thread_id: String,
    pub classification: Classification,
    pub tier: ModelTier,
    pub model: String,
    pub fragments: FragmentStream,
    /// Resolves after the thread is updated and the log write was attempted
    pub done: JoinHandle<ExchangeReport>,
}

#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub outcome: ExchangeOutcome,
    /// `None` when the log write failed
    pub record: Option<ChatRecord>,
}

/// Errors raised before any fragment is produced
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The core chat engine
pub struct ChatEngine {
    responder: Arc<StreamingResponder>,
    sessions: Arc<SessionStore>,
    chat_log: Arc<ChatLog>,
    models: TierModels,
    base_prompt: String,
    session_wait: Duration,
}

impl ChatEngine {
    pub fn new(
        responder: StreamingResponder,
        sessions: Arc<SessionStore>,
        chat_log: Arc<ChatLog>,
        models: TierModels,
        base_prompt: impl Into<String>,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            sessions,
            chat_log,
            models,
            base_prompt: base_prompt.into(),
            session_wait: Duration::from_secs(60),
        }
    }

    /// How long a new exchange waits for a busy thread
    pub fn with_session_wait(mut self, wait: Duration) -> Self {
        self.session_wait = wait;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn provider_name(&self) -> &str {
        self.responder.provider_name()
    }

    /// Route a message and start streaming the answer
    pub async fn start_exchange(&self, request: ExchangeRequest) -> Result<Exchange, ChatError> {
        if request.message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let thread_id = request
            .thread_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut session = self.sessions.acquire(&thread_id, self.session_wait).await?;
        session.add_user(&request.message);

        let classification = classify(&request.message);
        let selection = select(
            &request.message,
            classification.complexity,
            classification.topic,
        );
        let model = self.models.model_for(selection.tier).to_string();

        info!(
            thread_id = %thread_id,
            topic = %classification.topic,
            level = %classification.complexity,
            include_code = classification.include_code,
            tier = %selection.tier,
            reason = ?selection.reason,
            model = %model,
            "Routing decision"
        );

        let system_prompt = compose(
            &self.base_prompt,
            classification.topic,
            classification.complexity,
            classification.include_code,
        );

        let mut messages = Vec::with_capacity(session.history().len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend_from_slice(session.history());

        let (sink, fragments) = FragmentStream::channel(FRAGMENT_BUFFER);

        let responder = self.responder.clone();
        let chat_log = self.chat_log.clone();
        let tier = selection.tier;
        let task_model = model.clone();
        let sender = request.sender;
        let user_message = request.message;

        let done = tokio::spawn(async move {
            let outcome = responder.respond(&messages, tier, &task_model, sink).await;

            if outcome.status == ExchangeStatus::Completed {
                session.add_assistant(&outcome.answer);
            }
            session.record_turn(TurnState {
                classification,
                model_tier: outcome.tier,
                model: outcome.model.clone(),
                answer: outcome.answer.clone(),
            });
            debug!(
                thread_id = session.id(),
                messages = session.history().len(),
                status = ?outcome.status,
                "Thread updated"
            );
            drop(session);

            let record = match chat_log
                .record(&sender, &user_message, Some(&outcome.answer))
                .await
            {
                Ok(record) => Some(record),
                Err(e) => {
                    error!(
                        sender = %sender,
                        status = ?outcome.status,
                        "Failed to record exchange, answer was delivered without a log entry: {}",
                        e
                    );
                    None
                }
            };

            ExchangeReport { outcome, record }
        });

        Ok(Exchange {
            thread_id,
            classification,
            tier,
            model,
            fragments,
            done,
        })
    }
}

//! Conversation types and state management

mod sessions;

use serde::{Deserialize, Serialize};

use crate::core::{Classification, ModelTier};

pub use sessions::{SessionError, SessionGuard, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Routing and output of the most recent turn on a thread.
///
/// Kept for observability only; nothing reads it back to influence a later turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnState {
    pub classification: Classification,
    pub model_tier: ModelTier,
    pub model: String,
    pub answer: String,
}

/// One logical conversation thread.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    last_turn: Option<TurnState>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            last_turn: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message to the end of the history. Appended messages are never edited.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_user(&mut self, content: &str) {
        self.append(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: &str) {
        self.append(Message::assistant(content));
    }

    /// Messages oldest first.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_turn(&self) -> Option<&TurnState> {
        self.last_turn.as_ref()
    }

    pub fn record_turn(&mut self, turn: TurnState) {
        self.last_turn = Some(turn);
    }
}

//! Core routing and streaming components
//!
//! This module contains the orchestration logic for one exchange: classify the
//! question, compose the system prompt, pick a model tier, stream the answer,
//! and log the result.

mod chat;
mod chat_log;
pub mod classifier;
pub mod composer;
mod responder;
pub mod selector;

pub use chat::{ChatEngine, ChatError, Exchange, ExchangeRequest, ANONYMOUS_SENDER};
pub use chat_log::{ChatLog, ChatLogError, ChatRecord};
pub use classifier::Classification;
pub use responder::{Fragment, StreamingResponder};
pub use selector::{ModelTier, TierModels};

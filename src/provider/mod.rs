//! Remote reply provider
//!
//! The orchestrator sees the model as one call: an ordered list of messages in,
//! reply text or a [`ProviderError`] out.

mod openai;
mod scripted;

pub use openai::OpenAiProvider;
pub use scripted::{ScriptedProvider, ScriptedReply};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{ConversationTurn, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One entry of the outbound context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<ConversationTurn> for ChatMessage {
    fn from(turn: ConversationTurn) -> Self {
        let role = match turn.role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        };
        Self {
            role,
            content: turn.content,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider timed out")]
    Timeout,
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response malformed: {0}")]
    Malformed(String),
    #[error("provider returned no content")]
    Empty,
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
            Self::Empty => "empty",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

/// Generates one reply for an ordered message list
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Provider name (for logging)
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_conversion() {
        let msg: ChatMessage = ConversationTurn::assistant("hello").into();
        assert_eq!(msg, ChatMessage::assistant("hello"));
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(ChatMessage::system("be kind")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "be kind"}));
    }
}

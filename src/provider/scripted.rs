//! In-process provider that replays queued replies
//!
//! Used by tests and local runs without a model endpoint. Every call is
//! captured so callers can assert on the exact context that was sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{ChatMessage, ProviderError, ReplyProvider};

/// One queued outcome
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail,
}

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    fallback: Option<String>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` whenever the queue is empty
    pub fn with_fallback(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .push_back(ScriptedReply::Text(text.into()));
        self
    }

    pub fn push_failure(&self) -> &Self {
        self.replies.lock().push_back(ScriptedReply::Fail);
        self
    }

    /// Every context received so far, in call order
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ReplyProvider for ScriptedProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.lock().push(messages.to_vec());
        let next = self.replies.lock().pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail) => Err(ProviderError::Status {
                status: 503,
                body: "scripted failure".to_string(),
            }),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ProviderError::Transport("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

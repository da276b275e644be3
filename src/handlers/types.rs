//! API Request/Response Types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quota::QuotaState;

// =============================================================================
// HEALTH & INFRASTRUCTURE
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub ledger_records: u64,
    pub live_buffers: u64,
    pub memory_scope: String,
    pub provider: String,
}

// =============================================================================
// CHAT API
// =============================================================================

/// One prior turn supplied by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Only used when the server holds no turns for the caller
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeepenRequest {
    pub previous_reply: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub message_id: Uuid,
    pub remaining: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// QUERY QUOTA API
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryStatusResponse {
    pub can_query: bool,
    pub remaining: u32,
    pub limit: u32,
    pub used: u32,
    pub requires_registration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<QuotaState> for QueryStatusResponse {
    fn from(state: QuotaState) -> Self {
        let message = state
            .requires_registration
            .then(|| "Free query limit reached. Register to continue.".to_string());
        Self {
            can_query: state.allowed,
            remaining: state.remaining,
            limit: state.limit,
            used: state.used,
            requires_registration: state.requires_registration,
            message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub message: String,
    pub remaining: u32,
    pub used: u32,
    pub requires_registration: bool,
}

impl From<QuotaState> for RecordResponse {
    fn from(state: QuotaState) -> Self {
        Self {
            message: "Query recorded".to_string(),
            remaining: state.remaining,
            used: state.used,
            requires_registration: state.requires_registration,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionIdResponse {
    pub session_id: String,
}

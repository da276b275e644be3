//! Chat orchestration
//!
//! The only component that talks to identity, quota, memory, guard and the
//! provider. Each turn walks a fixed sequence of [`TurnStage`]s; a failure
//! before `Recorded` never charges the caller.

mod orchestrator;

pub use orchestrator::ChatOrchestrator;

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::AppError;
use crate::provider::ProviderError;
use crate::quota::{LedgerError, QuotaState};

/// Per-request state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    IdentityResolved,
    QuotaChecked,
    ContextAssembled,
    ProviderCalled,
    GuardApplied,
    MemoryUpdated,
    Recorded,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IdentityResolved => "identity_resolved",
            Self::QuotaChecked => "quota_checked",
            Self::ContextAssembled => "context_assembled",
            Self::ProviderCalled => "provider_called",
            Self::GuardApplied => "guard_applied",
            Self::MemoryUpdated => "memory_updated",
            Self::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

/// Successful reply
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    /// Fresh per reply; correlation only
    pub message_id: Uuid,
    /// Quota after this query was charged
    pub quota: QuotaState,
    /// The first reply leaked and this is the fallback retry
    pub recovered_from_leak: bool,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("quota exceeded ({} of {} used)", .0.used, .0.limit)]
    QuotaExceeded(QuotaState),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::QuotaExceeded(state) => AppError::QuotaExceeded {
                limit: state.limit,
                used: state.used,
                requires_registration: state.requires_registration,
            },
            ChatError::Provider(e) => e.into(),
            ChatError::Ledger(e) => e.into(),
        }
    }
}

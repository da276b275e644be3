//! Shared server state
//!
//! Owns the long-lived components (identity resolver, ledger, conversation
//! store, orchestrator) and hands them to handlers through `State<AppState>`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::auth::BearerAuthenticator;
use crate::chat::ChatOrchestrator;
use crate::config::ServerConfig;
use crate::guard::LeakageGuard;
use crate::identity::IdentityResolver;
use crate::memory::ConversationStore;
use crate::provider::{OpenAiProvider, ReplyProvider};
use crate::quota::{LedgerStore, QuotaLedger, WriteMode};

/// Application state type alias
pub type AppState = Arc<GuardState>;

pub struct GuardState {
    config: ServerConfig,
    resolver: IdentityResolver,
    orchestrator: ChatOrchestrator,
    started_at: Instant,
}

impl GuardState {
    /// Build state around the configured OpenAI-compatible provider
    pub fn new(config: ServerConfig) -> Result<Self> {
        let provider = OpenAiProvider::new(&config.provider, config.persona.preamble.clone())?;
        Self::with_provider(config, Arc::new(provider), WriteMode::from_env())
    }

    /// Build state around an explicit provider
    pub fn with_provider(
        config: ServerConfig,
        provider: Arc<dyn ReplyProvider>,
        write_mode: WriteMode,
    ) -> Result<Self> {
        let store = LedgerStore::open(&config.storage_path, write_mode).with_context(|| {
            format!("Failed to open query ledger at {:?}", config.storage_path)
        })?;

        let ledger = Arc::new(QuotaLedger::new(store, config.quota));
        let memory = Arc::new(ConversationStore::new(&config.memory));
        let guard = Arc::new(LeakageGuard::with_keywords(config.persona.name.clone()));
        info!(
            "Leakage guard ready (classifier: {}, provider: {})",
            guard.classifier_name(),
            provider.name()
        );

        let orchestrator = ChatOrchestrator::new(
            ledger,
            memory,
            guard,
            provider,
            config.persona.clone(),
        );
        let resolver =
            IdentityResolver::new(BearerAuthenticator::new(&config.identity.user_tokens));

        Ok(Self {
            config,
            resolver,
            orchestrator,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Persist buffered ledger writes
    pub fn flush(&self) -> Result<()> {
        self.orchestrator
            .ledger()
            .flush()
            .context("Failed to flush query ledger")
    }
}

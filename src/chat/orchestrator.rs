//! Turn orchestration over quota, memory, guard and provider

use std::sync::Arc;
use uuid::Uuid;

use super::{ChatError, TurnOutcome, TurnStage};
use crate::config::PersonaConfig;
use crate::guard::LeakageGuard;
use crate::identity::Identity;
use crate::memory::{recent_assistant_turns, ConversationStore, ConversationTurn};
use crate::metrics::{self, Timer};
use crate::provider::{ChatMessage, ProviderError, ReplyProvider};
use crate::quota::{Admission, QueryKind, QuotaLedger, QuotaPermit, QuotaState};

fn advance(stage: &mut TurnStage, next: TurnStage) {
    tracing::debug!(from = %stage, to = %next, "turn stage");
    *stage = next;
}

/// Keep the newest `capacity` turns
fn keep_tail(mut turns: Vec<ConversationTurn>, capacity: usize) -> Vec<ConversationTurn> {
    if turns.len() > capacity {
        turns.drain(..turns.len() - capacity);
    }
    turns
}

pub struct ChatOrchestrator {
    ledger: Arc<QuotaLedger>,
    memory: Arc<ConversationStore>,
    guard: Arc<LeakageGuard>,
    provider: Arc<dyn ReplyProvider>,
    persona: PersonaConfig,
}

impl ChatOrchestrator {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        memory: Arc<ConversationStore>,
        guard: Arc<LeakageGuard>,
        provider: Arc<dyn ReplyProvider>,
        persona: PersonaConfig,
    ) -> Self {
        Self {
            ledger,
            memory,
            guard,
            provider,
            persona,
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn memory(&self) -> &ConversationStore {
        &self.memory
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    async fn admit(&self, identity: &Identity, lockout_marker: bool) -> Result<QuotaPermit, ChatError> {
        match self.ledger.admit(identity, lockout_marker).await? {
            Admission::Granted(permit) => Ok(permit),
            Admission::Denied(state) => Err(ChatError::QuotaExceeded(state)),
        }
    }

    async fn call_provider(
        &self,
        purpose: &'static str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let result = {
            let _timer = Timer::new(metrics::PROVIDER_LATENCY.clone());
            self.provider.generate(messages).await
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::PROVIDER_CALLS_TOTAL
            .with_label_values(&[purpose, outcome])
            .inc();
        if let Err(e) = &result {
            tracing::warn!(
                provider = self.provider.name(),
                purpose,
                "Provider call failed: {}",
                e
            );
        }
        result
    }

    fn publish_buffer_gauge(&self) {
        metrics::LIVE_BUFFERS.set(self.memory.live_buffers() as i64);
    }

    /// Run one chat turn
    ///
    /// `client_history` seeds the context only when the server holds no turns
    /// for this identity; it must already be validated.
    #[tracing::instrument(skip_all, fields(identity = %identity.log_label()))]
    pub async fn submit_turn(
        &self,
        identity: &Identity,
        lockout_marker: bool,
        message: &str,
        client_history: Vec<ConversationTurn>,
    ) -> Result<TurnOutcome, ChatError> {
        let mut stage = TurnStage::IdentityResolved;

        let permit = self.admit(identity, lockout_marker).await?;
        advance(&mut stage, TurnStage::QuotaChecked);

        let buffer = self.memory.buffer_for(identity);
        if let Some(threshold) = self.memory.reset_threshold() {
            if buffer.clear_if_longer_than(threshold) {
                tracing::info!(threshold, "Conversation buffer over reset threshold; cleared");
            }
        }

        let mut history = buffer.snapshot();
        let mut seed = None;
        if history.is_empty() && !client_history.is_empty() {
            history = keep_tail(client_history, self.memory.capacity());
            seed = Some(history.clone());
        } else if !client_history.is_empty() {
            tracing::debug!("Server already holds turns; client history ignored");
        }

        let recent = recent_assistant_turns(&history, self.guard.poison_window());
        if self.guard.is_poisoned(&recent) {
            if seed.take().is_none() {
                buffer.clear();
            }
            history.clear();
        }

        let mut context: Vec<ChatMessage> = history.into_iter().map(ChatMessage::from).collect();
        context.push(ChatMessage::user(message));
        advance(&mut stage, TurnStage::ContextAssembled);

        let raw = self.call_provider("turn", &context).await?;
        advance(&mut stage, TurnStage::ProviderCalled);

        let mut reply = self.guard.sanitize(&raw);
        let leaked = self.guard.classify(&reply);
        if leaked {
            buffer.clear();
            seed = None;
            let fallback = [
                ChatMessage::system(self.persona.fallback_reminder.as_str()),
                ChatMessage::user(message),
            ];
            let retried = self.call_provider("fallback", &fallback).await?;
            reply = self.guard.sanitize(&retried);
            tracing::info!("Recovered from leaked reply with fallback context");
        }
        advance(&mut stage, TurnStage::GuardApplied);

        if leaked {
            buffer.append(ConversationTurn::assistant(reply.clone()));
        } else {
            if let Some(seed) = seed {
                buffer.seed_if_empty(seed);
            }
            buffer.append_pair(
                ConversationTurn::user(message),
                ConversationTurn::assistant(reply.clone()),
            );
        }
        self.publish_buffer_gauge();
        advance(&mut stage, TurnStage::MemoryUpdated);

        let quota = permit.commit(QueryKind::Chat)?;
        advance(&mut stage, TurnStage::Recorded);

        let message_id = Uuid::new_v4();
        tracing::info!(
            %message_id,
            remaining = quota.remaining,
            leaked,
            "Turn completed"
        );

        Ok(TurnOutcome {
            response: reply,
            message_id,
            quota,
            recovered_from_leak: leaked,
        })
    }

    /// Expand on a previous reply; charged like a turn
    #[tracing::instrument(skip_all, fields(identity = %identity.log_label()))]
    pub async fn deepen(
        &self,
        identity: &Identity,
        lockout_marker: bool,
        previous_reply: &str,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let permit = self.admit(identity, lockout_marker).await?;

        let context = [
            ChatMessage::system(self.persona.deepen_preamble.as_str()),
            ChatMessage::user(message),
            ChatMessage::assistant(previous_reply),
            ChatMessage::user(self.persona.deepen_instruction.as_str()),
        ];
        let raw = self.call_provider("deepen", &context).await?;
        let reply = self.guard.sanitize(&raw);

        self.memory
            .buffer_for(identity)
            .append(ConversationTurn::assistant(reply.clone()));
        self.publish_buffer_gauge();

        let quota = permit.commit(QueryKind::Deepen)?;
        let message_id = Uuid::new_v4();
        tracing::info!(%message_id, remaining = quota.remaining, "Deepen completed");

        Ok(TurnOutcome {
            response: reply,
            message_id,
            quota,
            recovered_from_leak: false,
        })
    }

    pub fn clear_memory(&self, identity: &Identity) {
        self.memory.clear(identity);
        tracing::info!(identity = %identity.log_label(), "Conversation memory cleared");
    }

    /// Current quota, straight from the ledger
    pub fn status(&self, identity: &Identity) -> Result<QuotaState, ChatError> {
        Ok(self.ledger.can_query(identity)?)
    }

    /// Charge one query without a model call (client acknowledgement)
    pub async fn record(
        &self,
        identity: &Identity,
        lockout_marker: bool,
    ) -> Result<QuotaState, ChatError> {
        let permit = self.admit(identity, lockout_marker).await?;
        Ok(permit.commit(QueryKind::Manual)?)
    }
}

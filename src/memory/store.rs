//! Buffer ownership under the configured memory scope

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::buffer::ConversationBuffer;
use crate::config::{MemoryConfig, MemoryScope};
use crate::identity::Identity;

/// Hands out the conversation buffer an identity should use
///
/// - `Global`: one buffer for the whole process, shared by every caller
/// - `PerIdentity`: one buffer per identity key, LRU-bounded and dropped after
///   an idle period
pub struct ConversationStore {
    scope: MemoryScope,
    capacity: usize,
    reset_threshold: Option<usize>,
    global: Arc<ConversationBuffer>,
    per_identity: moka::sync::Cache<String, Arc<ConversationBuffer>>,
}

impl ConversationStore {
    pub fn new(config: &MemoryConfig) -> Self {
        let max_buffers = config.max_live_buffers;
        let per_identity = moka::sync::Cache::builder()
            .max_capacity(max_buffers)
            .time_to_idle(Duration::from_secs(config.buffer_idle_secs))
            .eviction_listener(move |_key: Arc<String>, _value, cause| {
                if cause == moka::notification::RemovalCause::Size {
                    info!(
                        "Evicted conversation buffer (LRU, max_buffers={})",
                        max_buffers
                    );
                }
            })
            .build();

        Self {
            scope: config.scope,
            capacity: config.capacity,
            reset_threshold: config.reset_threshold,
            global: Arc::new(ConversationBuffer::new(config.capacity)),
            per_identity,
        }
    }

    pub fn scope(&self) -> MemoryScope {
        self.scope
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset_threshold(&self) -> Option<usize> {
        self.reset_threshold
    }

    /// Buffer for `identity`, created empty on first use
    pub fn buffer_for(&self, identity: &Identity) -> Arc<ConversationBuffer> {
        match self.scope {
            MemoryScope::Global => self.global.clone(),
            MemoryScope::PerIdentity => {
                let capacity = self.capacity;
                self.per_identity
                    .get_with(identity.key(), || Arc::new(ConversationBuffer::new(capacity)))
            }
        }
    }

    /// Empty the buffer `identity` uses without creating one
    pub fn clear(&self, identity: &Identity) {
        match self.scope {
            MemoryScope::Global => self.global.clear(),
            MemoryScope::PerIdentity => {
                if let Some(buffer) = self.per_identity.get(&identity.key()) {
                    buffer.clear();
                }
            }
        }
    }

    /// Buffers currently held in process
    pub fn live_buffers(&self) -> u64 {
        match self.scope {
            MemoryScope::Global => 1,
            MemoryScope::PerIdentity => {
                self.per_identity.run_pending_tasks();
                self.per_identity.entry_count()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{SessionToken, UserId};
    use crate::memory::ConversationTurn;

    fn config(scope: MemoryScope) -> MemoryConfig {
        MemoryConfig {
            scope,
            ..Default::default()
        }
    }

    #[test]
    fn test_per_identity_isolation() {
        let store = ConversationStore::new(&config(MemoryScope::PerIdentity));
        let alice = Identity::Registered(UserId::new("alice"));
        let anon = Identity::Anonymous(SessionToken::mint());

        store.buffer_for(&alice).append(ConversationTurn::user("hi"));
        assert_eq!(store.buffer_for(&alice).len(), 1);
        assert!(store.buffer_for(&anon).is_empty());
        assert_eq!(store.live_buffers(), 2);

        store.clear(&alice);
        assert!(store.buffer_for(&alice).is_empty());
    }

    #[test]
    fn test_global_scope_shares_buffer() {
        let store = ConversationStore::new(&config(MemoryScope::Global));
        let a = Identity::Anonymous(SessionToken::mint());
        let b = Identity::Anonymous(SessionToken::mint());

        store.buffer_for(&a).append(ConversationTurn::user("shared"));
        assert_eq!(store.buffer_for(&b).len(), 1);
        store.clear(&b);
        assert!(store.buffer_for(&a).is_empty());
        assert_eq!(store.live_buffers(), 1);
    }

    #[test]
    fn test_clear_unknown_identity_creates_nothing() {
        let store = ConversationStore::new(&config(MemoryScope::PerIdentity));
        store.clear(&Identity::Anonymous(SessionToken::mint()));
        assert_eq!(store.live_buffers(), 0);
    }
}

//! Conversation memory tests
//!
//! - capacity holds under concurrent appends
//! - scopes decide which callers share a buffer
//! - the optional reset threshold clears long buffers before a turn
//!
//! Run with: `cargo test --test memory_tests`

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use persona_guard::chat::ChatOrchestrator;
use persona_guard::config::{MemoryConfig, MemoryScope, PersonaConfig, QuotaConfig};
use persona_guard::guard::LeakageGuard;
use persona_guard::identity::{Identity, SessionToken, UserId};
use persona_guard::memory::{ConversationBuffer, ConversationStore, ConversationTurn, Role};
use persona_guard::provider::{ChatMessage, ScriptedProvider};
use persona_guard::quota::{LedgerStore, QuotaLedger, WriteMode};

fn orchestrator(
    dir: &TempDir,
    memory: MemoryConfig,
    provider: Arc<ScriptedProvider>,
) -> ChatOrchestrator {
    let store = LedgerStore::open(dir.path(), WriteMode::Async).unwrap();
    let quota = QuotaConfig {
        anonymous_lifetime_limit: 100,
        registered_daily_limit: 100,
    };
    let persona = PersonaConfig::default();
    ChatOrchestrator::new(
        Arc::new(QuotaLedger::new(store, quota)),
        Arc::new(ConversationStore::new(&memory)),
        Arc::new(LeakageGuard::with_keywords(persona.name.clone())),
        provider,
        persona,
    )
}

#[test]
fn test_append_one_to_forty_one_keeps_two_to_forty_one() {
    let buffer = ConversationBuffer::new(40);
    for i in 1..=41 {
        buffer.append(ConversationTurn::user(i.to_string()));
    }
    let contents: Vec<String> = buffer.snapshot().into_iter().map(|t| t.content).collect();
    let expected: Vec<String> = (2..=41).map(|i| i.to_string()).collect();
    assert_eq!(contents, expected);
}

#[test]
fn test_concurrent_appends_respect_capacity() {
    let buffer = Arc::new(ConversationBuffer::new(40));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    buffer.append(ConversationTurn::assistant(format!("{t}-{i}")));
                    assert!(buffer.len() <= 40);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(buffer.len(), 40);
    assert!(buffer.snapshot().iter().all(|t| t.role == Role::Assistant));
}

#[test]
fn test_concurrent_pairs_never_interleave() {
    let buffer = Arc::new(ConversationBuffer::new(40));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let tag = format!("{t}-{i}");
                    buffer.append_pair(
                        ConversationTurn::user(tag.clone()),
                        ConversationTurn::assistant(tag),
                    );
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let turns = buffer.snapshot();
    assert_eq!(turns.len(), 40);
    for pair in turns.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[0].content, pair[1].content);
    }
}

#[tokio::test]
async fn test_global_scope_keeps_concurrent_turns_paired() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::with_fallback("ok"));
    let memory = MemoryConfig {
        scope: MemoryScope::Global,
        ..MemoryConfig::default()
    };
    let orch = Arc::new(orchestrator(&dir, memory, provider));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let orch = orch.clone();
            tokio::spawn(async move {
                let id = Identity::Anonymous(SessionToken::mint());
                orch.submit_turn(&id, false, &format!("m{i}"), vec![])
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let anyone = Identity::Anonymous(SessionToken::mint());
    let turns = orch.memory().buffer_for(&anyone).snapshot();
    assert_eq!(turns.len(), 32);
    for pair in turns.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1], ConversationTurn::assistant("ok"));
    }
}

#[test]
fn test_per_identity_scope_keeps_callers_apart() {
    let store = ConversationStore::new(&MemoryConfig::default());
    let anon = Identity::Anonymous(SessionToken::mint());
    let user = Identity::Registered(UserId::new("dana"));

    store.buffer_for(&anon).append(ConversationTurn::user("secret"));
    assert!(store.buffer_for(&user).is_empty());
}

#[tokio::test]
async fn test_global_scope_shares_context_across_callers() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply("one").push_reply("two");
    let memory = MemoryConfig {
        scope: MemoryScope::Global,
        ..MemoryConfig::default()
    };
    let orch = orchestrator(&dir, memory, provider.clone());

    let a = Identity::Anonymous(SessionToken::mint());
    let b = Identity::Anonymous(SessionToken::mint());
    orch.submit_turn(&a, false, "from a", vec![]).await.unwrap();
    orch.submit_turn(&b, false, "from b", vec![]).await.unwrap();

    assert_eq!(
        provider.calls()[1],
        vec![
            ChatMessage::user("from a"),
            ChatMessage::assistant("one"),
            ChatMessage::user("from b"),
        ]
    );
}

#[tokio::test]
async fn test_reset_threshold_clears_before_context() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::with_fallback("ok"));
    let memory = MemoryConfig {
        reset_threshold: Some(4),
        ..MemoryConfig::default()
    };
    let orch = orchestrator(&dir, memory, provider.clone());
    let id = Identity::Anonymous(SessionToken::mint());

    // Two turns leave four entries; the third still sees them, the fourth does not
    for msg in ["a", "b", "c"] {
        orch.submit_turn(&id, false, msg, vec![]).await.unwrap();
    }
    assert_eq!(provider.calls()[2].len(), 5);

    orch.submit_turn(&id, false, "d", vec![]).await.unwrap();
    assert_eq!(provider.calls()[3], vec![ChatMessage::user("d")]);
}

#[tokio::test]
async fn test_client_history_bounded_to_capacity() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::with_fallback("ok"));
    let memory = MemoryConfig {
        capacity: 4,
        ..MemoryConfig::default()
    };
    let orch = orchestrator(&dir, memory, provider.clone());
    let id = Identity::Anonymous(SessionToken::mint());
    let history: Vec<_> = (0..4)
        .map(|i| ConversationTurn::user(format!("h{i}")))
        .collect();

    orch.submit_turn(&id, false, "now", history).await.unwrap();
    let buffer = orch.memory().buffer_for(&id);
    let contents: Vec<String> = buffer.snapshot().into_iter().map(|t| t.content).collect();
    assert_eq!(contents, vec!["h2", "h3", "now", "ok"]);
}

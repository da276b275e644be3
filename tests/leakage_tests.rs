//! Leakage guard and recovery tests
//!
//! - denylist scoring tolerates a single coincidental term
//! - a leaked reply purges memory and is retried once without history
//! - a failed retry surfaces as a provider error and charges nothing
//!
//! Run with: `cargo test --test leakage_tests`

use std::sync::Arc;

use tempfile::TempDir;

use persona_guard::chat::{ChatError, ChatOrchestrator};
use persona_guard::config::{MemoryConfig, PersonaConfig, QuotaConfig};
use persona_guard::guard::{KeywordClassifier, LeakageClassifier, LeakageGuard};
use persona_guard::identity::{Identity, SessionToken};
use persona_guard::memory::{ConversationStore, ConversationTurn};
use persona_guard::provider::{ChatMessage, MessageRole, ScriptedProvider};
use persona_guard::quota::{LedgerStore, QuotaLedger, WriteMode};

struct Fixture {
    _dir: TempDir,
    provider: Arc<ScriptedProvider>,
    orch: ChatOrchestrator,
}

fn fixture_with(guard: LeakageGuard) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::open(dir.path(), WriteMode::Async).unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    let orch = ChatOrchestrator::new(
        Arc::new(QuotaLedger::new(store, QuotaConfig::default())),
        Arc::new(ConversationStore::new(&MemoryConfig::default())),
        Arc::new(guard),
        provider.clone(),
        PersonaConfig::default(),
    );
    Fixture {
        _dir: dir,
        provider,
        orch,
    }
}

fn fixture() -> Fixture {
    fixture_with(LeakageGuard::with_keywords(PersonaConfig::default().name))
}

#[test]
fn test_denylist_thresholds() {
    let c = KeywordClassifier::builtin();
    assert!(!c.is_leaked("Your problem is a doorway."));
    assert!(c.is_leaked("def solve(): this algorithm is linear"));
    assert!(c.is_leaked("Changelog: version 2.0.0 fixes a bug"));
    assert!(c.is_leaked("题目：给定一个整数数组"));
}

#[tokio::test]
async fn test_changelog_reply_is_retried() {
    let f = fixture();
    let id = Identity::Anonymous(SessionToken::mint());
    f.provider
        .push_reply("- fix: crash on load\n- add: dark mode")
        .push_reply("Stillness first.");

    let out = f.orch.submit_turn(&id, false, "What is new?", vec![]).await.unwrap();
    assert!(out.recovered_from_leak);
    assert_eq!(out.response, "Stillness first.");
    assert_eq!(f.provider.call_count(), 2);
}

#[tokio::test]
async fn test_three_keyword_reply_retried_exactly_once() {
    let f = fixture();
    let id = Identity::Anonymous(SessionToken::mint());
    let buffer = f.orch.memory().buffer_for(&id);
    buffer.append(ConversationTurn::user("earlier"));
    buffer.append(ConversationTurn::assistant("A calm answer."));

    f.provider
        .push_reply("public function solve() uses an algorithm")
        .push_reply("Calm returns.");
    let out = f
        .orch
        .submit_turn(&id, false, "Speak of calm", vec![])
        .await
        .unwrap();

    assert!(out.recovered_from_leak);
    assert_eq!(out.response, "Calm returns.");
    assert_eq!(f.provider.call_count(), 2);

    // First call carried history, the retry does not
    assert_eq!(f.provider.calls()[0].len(), 3);
    let retry = &f.provider.calls()[1];
    assert_eq!(retry[0].role, MessageRole::System);
    assert_eq!(retry[1], ChatMessage::user("Speak of calm"));

    assert_eq!(
        buffer.snapshot(),
        vec![ConversationTurn::assistant("Calm returns.")]
    );
}

#[tokio::test]
async fn test_retry_reply_is_not_classified_again() {
    let f = fixture();
    let id = Identity::Anonymous(SessionToken::mint());
    f.provider
        .push_reply("class Foo extends Bar")
        .push_reply("class and function, yet still the persona");

    let out = f.orch.submit_turn(&id, false, "hi", vec![]).await.unwrap();
    assert_eq!(out.response, "class and function, yet still the persona");
    assert_eq!(f.provider.call_count(), 2);
}

#[tokio::test]
async fn test_failed_retry_keeps_purge_and_charges_nothing() {
    let f = fixture();
    let id = Identity::Anonymous(SessionToken::mint());
    let buffer = f.orch.memory().buffer_for(&id);
    buffer.append(ConversationTurn::user("keep?"));

    f.provider
        .push_reply("def twoSum with a hash table")
        .push_failure();
    let err = f
        .orch
        .submit_turn(&id, false, "hello", vec![])
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Provider(_)));
    assert!(buffer.is_empty());
    assert_eq!(f.orch.status(&id).unwrap().used, 0);
}

struct NeverLeaks;

impl LeakageClassifier for NeverLeaks {
    fn score(&self, _text: &str) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

#[tokio::test]
async fn test_custom_classifier_replaces_keywords() {
    let f = fixture_with(LeakageGuard::new(Arc::new(NeverLeaks), "ORAKH VOX NEMIS"));
    let id = Identity::Anonymous(SessionToken::mint());
    f.provider.push_reply("def solve(): the algorithm");

    let out = f.orch.submit_turn(&id, false, "code?", vec![]).await.unwrap();
    assert!(!out.recovered_from_leak);
    assert_eq!(f.provider.call_count(), 1);
}

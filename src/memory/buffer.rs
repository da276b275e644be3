//! Bounded conversation buffer

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

/// Speaker of a stored turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(anyhow::anyhow!(
                "invalid role '{other}' (allowed: user, assistant)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Up to `n` most recent assistant turns of `turns`, newest last
pub fn recent_assistant_turns(turns: &[ConversationTurn], n: usize) -> Vec<String> {
    let mut recent: Vec<String> = turns
        .iter()
        .rev()
        .filter(|t| t.role == Role::Assistant)
        .take(n)
        .map(|t| t.content.clone())
        .collect();
    recent.reverse();
    recent
}

/// Ordered turns, oldest first, never longer than `capacity`
///
/// Every operation takes the internal lock, so readers never see a
/// half-applied append or clear. The lock is never held across an await.
#[derive(Debug)]
pub struct ConversationBuffer {
    turns: Mutex<VecDeque<ConversationTurn>>,
    capacity: usize,
}

impl ConversationBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one turn, evicting from the head to stay within capacity
    pub fn append(&self, turn: ConversationTurn) {
        let mut turns = self.turns.lock();
        turns.push_back(turn);
        self.evict(&mut turns);
    }

    /// Append a user turn and its reply under one lock acquisition
    ///
    /// Concurrent writers sharing the buffer can never land between the two.
    pub fn append_pair(&self, user: ConversationTurn, assistant: ConversationTurn) {
        let mut turns = self.turns.lock();
        turns.push_back(user);
        turns.push_back(assistant);
        self.evict(&mut turns);
    }

    fn evict(&self, turns: &mut VecDeque<ConversationTurn>) {
        while turns.len() > self.capacity {
            turns.pop_front();
        }
    }

    /// Independent copy of the current turns
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.turns.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }

    /// Load `turns` only if the buffer is empty; returns whether it did
    ///
    /// Check and load happen under one lock acquisition.
    pub fn seed_if_empty(&self, seed: Vec<ConversationTurn>) -> bool {
        let mut turns = self.turns.lock();
        if !turns.is_empty() || seed.is_empty() {
            return false;
        }
        let skip = seed.len().saturating_sub(self.capacity);
        turns.extend(seed.into_iter().skip(skip));
        true
    }

    /// Clear when holding more than `threshold` turns; returns whether it did
    pub fn clear_if_longer_than(&self, threshold: usize) -> bool {
        let mut turns = self.turns.lock();
        if turns.len() > threshold {
            turns.clear();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_evicts_from_head() {
        let buffer = ConversationBuffer::new(40);
        for i in 1..=41 {
            buffer.append(ConversationTurn::user(i.to_string()));
        }
        let snap = buffer.snapshot();
        assert_eq!(snap.len(), 40);
        assert_eq!(snap.first().unwrap().content, "2");
        assert_eq!(snap.last().unwrap().content, "41");
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let buffer = ConversationBuffer::new(3);
        for i in 0..10 {
            buffer.append(ConversationTurn::assistant(i.to_string()));
            assert!(buffer.len() <= 3);
        }
    }

    #[test]
    fn test_clear_then_append_starts_fresh() {
        let buffer = ConversationBuffer::new(40);
        buffer.append(ConversationTurn::user("a"));
        buffer.append(ConversationTurn::assistant("b"));
        buffer.clear();
        assert!(buffer.snapshot().is_empty());
        buffer.append(ConversationTurn::user("c"));
        assert_eq!(buffer.snapshot(), vec![ConversationTurn::user("c")]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let buffer = ConversationBuffer::new(4);
        buffer.append(ConversationTurn::user("a"));
        let snap = buffer.snapshot();
        buffer.clear();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_recent_assistant_turns() {
        let buffer = ConversationBuffer::new(40);
        for i in 0..5 {
            buffer.append(ConversationTurn::user(format!("q{i}")));
            buffer.append(ConversationTurn::assistant(format!("a{i}")));
        }
        assert_eq!(
            recent_assistant_turns(&buffer.snapshot(), 3),
            vec!["a2", "a3", "a4"]
        );
        assert!(recent_assistant_turns(&[ConversationTurn::user("q")], 3).is_empty());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let buffer = ConversationBuffer::new(2);
        let seed = vec![
            ConversationTurn::user("1"),
            ConversationTurn::assistant("2"),
            ConversationTurn::user("3"),
        ];
        assert!(buffer.seed_if_empty(seed.clone()));
        assert_eq!(
            buffer.snapshot(),
            vec![ConversationTurn::assistant("2"), ConversationTurn::user("3")]
        );
        assert!(!buffer.seed_if_empty(seed));
    }

    #[test]
    fn test_clear_if_longer_than() {
        let buffer = ConversationBuffer::new(40);
        for i in 0..31 {
            buffer.append(ConversationTurn::user(i.to_string()));
        }
        assert!(!buffer.clear_if_longer_than(31));
        assert!(buffer.clear_if_longer_than(30));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("system".parse::<Role>().is_err());
    }
}

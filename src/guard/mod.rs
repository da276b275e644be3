//! Leakage guard
//!
//! Replies sometimes drift out of persona into code, changelogs or
//! algorithm-puzzle write-ups. The guard cleans up persona headers, scores
//! replies through a pluggable [`LeakageClassifier`], and flags stored context
//! that has already been poisoned by such replies.

mod keywords;

pub use keywords::{KeywordClassifier, DEFAULT_DENYLIST};

use std::sync::Arc;

use crate::constants::{LEAKAGE_TOLERANCE, POISON_SCAN_WINDOW};
use crate::metrics;

/// Scores a reply for out-of-persona content
pub trait LeakageClassifier: Send + Sync {
    /// Number of distinct leakage signals found in `text`
    fn score(&self, text: &str) -> usize;

    /// Classifier name (for logging)
    fn name(&self) -> &'static str;

    /// Human-readable signals behind a score, for logging
    fn signals(&self, _text: &str) -> Vec<String> {
        Vec::new()
    }

    /// More than one signal is systematic leakage; a single hit is coincidence
    fn is_leaked(&self, text: &str) -> bool {
        self.score(text) > LEAKAGE_TOLERANCE
    }
}

/// Drop a leading line that starts with the persona name, then trim
///
/// A reply without such a header comes back trimmed and otherwise unchanged.
pub fn strip_persona_header(text: &str, persona_name: &str) -> String {
    let trimmed = text.trim();
    if persona_name.is_empty() {
        return trimmed.to_string();
    }
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.trim().starts_with(persona_name) => rest.trim().to_string(),
        None if trimmed.starts_with(persona_name) => String::new(),
        _ => trimmed.to_string(),
    }
}

pub struct LeakageGuard {
    classifier: Arc<dyn LeakageClassifier>,
    persona_name: String,
    poison_window: usize,
}

impl LeakageGuard {
    pub fn new(classifier: Arc<dyn LeakageClassifier>, persona_name: impl Into<String>) -> Self {
        Self {
            classifier,
            persona_name: persona_name.into(),
            poison_window: POISON_SCAN_WINDOW,
        }
    }

    /// Guard over the built-in keyword denylist
    pub fn with_keywords(persona_name: impl Into<String>) -> Self {
        Self::new(Arc::new(KeywordClassifier::builtin()), persona_name)
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// How many recent assistant turns [`is_poisoned`](Self::is_poisoned) expects
    pub fn poison_window(&self) -> usize {
        self.poison_window
    }

    pub fn sanitize(&self, text: &str) -> String {
        strip_persona_header(text, &self.persona_name)
    }

    /// Whether a fresh reply leaked
    pub fn classify(&self, text: &str) -> bool {
        let score = self.classifier.score(text);
        let leaked = score > LEAKAGE_TOLERANCE;
        if leaked {
            metrics::LEAKAGE_DETECTIONS_TOTAL
                .with_label_values(&["reply"])
                .inc();
            tracing::warn!(
                classifier = self.classifier.name(),
                score,
                signals = ?self.classifier.signals(text),
                "Reply leaked out of persona"
            );
        } else if score > 0 {
            tracing::debug!(score, "Reply within leakage tolerance");
        }
        leaked
    }

    /// Whether any of the given stored assistant turns individually leaked
    pub fn is_poisoned(&self, recent_assistant: &[String]) -> bool {
        let poisoned = recent_assistant
            .iter()
            .any(|turn| self.classifier.is_leaked(turn));
        if poisoned {
            metrics::LEAKAGE_DETECTIONS_TOTAL
                .with_label_values(&["context"])
                .inc();
            tracing::warn!(
                classifier = self.classifier.name(),
                window = recent_assistant.len(),
                "Stored context poisoned"
            );
        }
        poisoned
    }
}

//! Bearer credential check for registered users
//!
//! Account management lives outside this service; here a configured table maps
//! opaque bearer tokens to user ids. Authentication is optional: a request
//! without a valid credential is served as an anonymous session.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::identity::UserId;
use crate::validation;

/// Outcome of inspecting the `Authorization` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerOutcome {
    /// No `Authorization` header, or not a bearer scheme
    Absent,
    /// Credential matched a configured user
    Valid(UserId),
    /// Bearer credential present but unknown
    Invalid,
}

/// Constant-time string comparison to prevent timing attacks
///
/// Leaks the length of the shorter string, which is fine for opaque tokens.
/// Lengths compare as a whole; truncating their difference to a byte would
/// equate lengths that differ by a multiple of 256.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let mut result = u8::from(a.len() != b.len());

    let min_len = std::cmp::min(a.len(), b.len());
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    for i in 0..min_len {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

/// Validates bearer credentials against the configured token table
#[derive(Clone, Default)]
pub struct BearerAuthenticator {
    tokens: Vec<(String, UserId)>,
}

impl BearerAuthenticator {
    /// Build from `(token, user_id)` pairs; pairs with an unusable user id are skipped
    pub fn new(pairs: &[(String, String)]) -> Self {
        let tokens = pairs
            .iter()
            .filter_map(|(token, user)| match validation::validate_user_id(user) {
                Ok(()) => Some((token.clone(), UserId::new(user.clone()))),
                Err(e) => {
                    tracing::warn!("Skipping bearer credential for invalid user id: {}", e);
                    None
                }
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Look up a presented token
    ///
    /// Every entry is compared so timing does not reveal which one matched.
    pub fn validate(&self, presented: &str) -> Option<UserId> {
        let mut found = None;
        for (token, user) in &self.tokens {
            if constant_time_compare(token, presented) && found.is_none() {
                found = Some(user.clone());
            }
        }
        found
    }

    /// Inspect request headers for a bearer credential
    pub fn authenticate(&self, headers: &HeaderMap) -> BearerOutcome {
        let Some(raw) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return BearerOutcome::Absent;
        };

        let Some((scheme, token)) = raw.trim().split_once(' ') else {
            return BearerOutcome::Absent;
        };
        if !scheme.eq_ignore_ascii_case("bearer") {
            return BearerOutcome::Absent;
        }

        let token = token.trim();
        if token.is_empty() {
            return BearerOutcome::Invalid;
        }

        match self.validate(token) {
            Some(user) => BearerOutcome::Valid(user),
            None => BearerOutcome::Invalid,
        }
    }
}

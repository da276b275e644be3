//! Session identity resolution
//!
//! Every request resolves to exactly one [`Identity`]: a registered user when a
//! valid bearer credential is presented, otherwise an anonymous session carried
//! by the `session_id` cookie. A request with neither gets a freshly minted
//! session token, which the HTTP layer hands back as a cookie.
//!
//! Resolution never touches storage.

use axum::http::{header::COOKIE, HeaderMap};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::auth::{BearerAuthenticator, BearerOutcome};
use crate::constants::{LOCKOUT_COOKIE, SESSION_COOKIE, SESSION_TOKEN_BYTES};
use crate::validation;

/// Authenticated principal
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque anonymous session token
///
/// `Debug` prints a fingerprint so tokens never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a new 128-bit random token (32 lowercase hex chars)
    pub fn mint() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept a client-presented token if it is well formed
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        validation::validate_session_token(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

/// Short SHA-256 fingerprint for log correlation
pub fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..6])
}

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Registered(UserId),
    Anonymous(SessionToken),
}

impl Identity {
    /// Ledger and buffer key; the two kinds never share a namespace
    pub fn key(&self) -> String {
        match self {
            Self::Registered(user) => format!("user:{}", user.as_str()),
            Self::Anonymous(token) => format!("anon:{}", token.as_str()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous(_))
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::Anonymous(_) => "anonymous",
        }
    }

    /// Safe to log: user ids verbatim, session tokens fingerprinted
    pub fn log_label(&self) -> String {
        match self {
            Self::Registered(user) => format!("user:{user}"),
            Self::Anonymous(token) => format!("anon#{}", token.fingerprint()),
        }
    }
}

/// Result of resolving one request
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// A session token was minted for this request; the caller must set the cookie
    pub minted: bool,
    /// The client presented the lockout marker
    pub lockout_marker: bool,
}

/// Read a cookie value from the `Cookie` header(s)
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
}

/// Maps request headers to an [`Identity`]
#[derive(Clone, Default)]
pub struct IdentityResolver {
    auth: BearerAuthenticator,
}

impl IdentityResolver {
    pub fn new(auth: BearerAuthenticator) -> Self {
        Self { auth }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> ResolvedIdentity {
        let lockout_marker = cookie_value(headers, LOCKOUT_COOKIE)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        match self.auth.authenticate(headers) {
            BearerOutcome::Valid(user) => {
                return ResolvedIdentity {
                    identity: Identity::Registered(user),
                    minted: false,
                    lockout_marker,
                };
            }
            BearerOutcome::Invalid => {
                tracing::warn!("Unknown bearer credential, serving request as anonymous");
            }
            BearerOutcome::Absent => {}
        }

        if let Some(raw) = cookie_value(headers, SESSION_COOKIE) {
            match SessionToken::parse(raw) {
                Ok(token) => {
                    return ResolvedIdentity {
                        identity: Identity::Anonymous(token),
                        minted: false,
                        lockout_marker,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        cookie = %fingerprint(raw),
                        "Malformed session cookie ignored: {}",
                        e
                    );
                }
            }
        }

        let token = SessionToken::mint();
        tracing::debug!(session = %token.fingerprint(), "Minted anonymous session");
        ResolvedIdentity {
            identity: Identity::Anonymous(token),
            minted: true,
            lockout_marker,
        }
    }
}

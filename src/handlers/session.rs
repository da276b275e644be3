//! Cookie carrier for anonymous sessions and the lockout marker
//!
//! The server only ever sets the marker after the ledger confirmed that an
//! anonymous session is exhausted, and expires a marker the ledger contradicts.
//! Registered callers never get or lose a marker.

use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};
use std::convert::Infallible;

use crate::constants::{
    LOCKOUT_COOKIE, LOCKOUT_COOKIE_MAX_AGE_SECS, SESSION_COOKIE, SESSION_COOKIE_MAX_AGE_SECS,
};
use crate::errors::AppError;
use crate::identity::{Identity, ResolvedIdentity, SessionToken};
use crate::quota::QuotaState;

/// Render one `Set-Cookie` value
fn cookie_line(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut line = format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        line.push_str("; Secure");
    }
    line
}

/// `Set-Cookie` headers collected while handling one request
#[derive(Debug, Default)]
pub struct SetCookies {
    values: Vec<HeaderValue>,
    secure: bool,
}

impl SetCookies {
    pub fn new(secure: bool) -> Self {
        Self {
            values: Vec::new(),
            secure,
        }
    }

    /// Start with the session cookie if the resolver minted a token
    pub fn for_request(resolved: &ResolvedIdentity, secure: bool) -> Self {
        let mut cookies = Self::new(secure);
        if let (true, Identity::Anonymous(token)) = (resolved.minted, &resolved.identity) {
            cookies.session(token);
        }
        cookies
    }

    fn push(&mut self, line: String) {
        match HeaderValue::from_str(&line) {
            Ok(value) => self.values.push(value),
            Err(e) => tracing::warn!("Dropping unrepresentable cookie: {}", e),
        }
    }

    pub fn session(&mut self, token: &SessionToken) {
        let line = cookie_line(
            SESSION_COOKIE,
            token.as_str(),
            SESSION_COOKIE_MAX_AGE_SECS,
            self.secure,
        );
        self.push(line);
    }

    pub fn lockout(&mut self) {
        let line = cookie_line(LOCKOUT_COOKIE, "true", LOCKOUT_COOKIE_MAX_AGE_SECS, self.secure);
        self.push(line);
    }

    pub fn expire(&mut self, name: &str) {
        let line = cookie_line(name, "", 0, self.secure);
        self.push(line);
    }

    /// Reconcile the marker with a quota state the ledger just produced
    pub fn observe_quota(&mut self, resolved: &ResolvedIdentity, quota: &QuotaState) {
        if !resolved.identity.is_anonymous() {
            return;
        }
        if quota.locked_permanently {
            self.lockout();
        } else if resolved.lockout_marker {
            self.expire(LOCKOUT_COOKIE);
        }
    }

    /// Set the marker when a request was refused because the session is exhausted
    pub fn observe_error(&mut self, resolved: &ResolvedIdentity, err: &AppError) {
        if let AppError::QuotaExceeded {
            requires_registration: true,
            ..
        } = err
        {
            if resolved.identity.is_anonymous() {
                self.lockout();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoResponseParts for SetCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for value in self.values {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;

    fn anonymous(minted: bool, lockout_marker: bool) -> ResolvedIdentity {
        ResolvedIdentity {
            identity: Identity::Anonymous(SessionToken::mint()),
            minted,
            lockout_marker,
        }
    }

    fn rendered(cookies: &SetCookies) -> Vec<String> {
        cookies
            .values
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_minted_session_sets_cookie() {
        let resolved = anonymous(true, false);
        let cookies = SetCookies::for_request(&resolved, false);
        let lines = rendered(&cookies);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("session_id="));
        assert!(lines[0].contains("Max-Age=86400"));
        assert!(lines[0].contains("HttpOnly"));
        assert!(!lines[0].contains("Secure"));
    }

    #[test]
    fn test_existing_session_sets_nothing() {
        let cookies = SetCookies::for_request(&anonymous(false, false), true);
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_exhausted_sets_marker() {
        let resolved = anonymous(false, false);
        let mut cookies = SetCookies::new(true);
        cookies.observe_quota(&resolved, &QuotaState::anonymous(5, 5));
        let lines = rendered(&cookies);
        assert!(lines[0].starts_with("limit_reached=true"));
        assert!(lines[0].contains("Max-Age=31536000"));
        assert!(lines[0].ends_with("Secure"));
    }

    #[test]
    fn test_stale_marker_expired() {
        let resolved = anonymous(false, true);
        let mut cookies = SetCookies::new(false);
        cookies.observe_quota(&resolved, &QuotaState::anonymous(1, 5));
        assert!(rendered(&cookies)[0].starts_with("limit_reached=; Max-Age=0"));
    }

    #[test]
    fn test_registered_marker_untouched() {
        let resolved = ResolvedIdentity {
            identity: Identity::Registered(UserId::new("alice")),
            minted: false,
            lockout_marker: true,
        };
        let mut cookies = SetCookies::new(false);
        cookies.observe_quota(&resolved, &QuotaState::registered(10, 10));
        cookies.observe_error(
            &resolved,
            &AppError::QuotaExceeded {
                limit: 10,
                used: 10,
                requires_registration: false,
            },
        );
        assert!(cookies.is_empty());
    }
}

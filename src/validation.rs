//! Input validation for everything a client can send
//!
//! Runs before any state change: a request that fails here leaves the ledger,
//! the buffers and the provider untouched.

use anyhow::{anyhow, Result};

use crate::memory::Role;

/// Maximum lengths
pub const MAX_USER_ID_LENGTH: usize = 128;
pub const MAX_SESSION_TOKEN_LENGTH: usize = 128;
pub const MAX_MESSAGE_LENGTH: usize = 8_000;
pub const MAX_REPLY_LENGTH: usize = 50_000; // 50KB, previous replies echoed back for deepen

/// Validate a registered user id
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(anyhow!("user_id cannot be empty"));
    }

    if user_id.len() > MAX_USER_ID_LENGTH {
        return Err(anyhow!(
            "user_id too long: {} chars (max: {})",
            user_id.len(),
            MAX_USER_ID_LENGTH
        ));
    }

    if !user_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.')
    {
        return Err(anyhow!(
            "user_id contains invalid characters (allowed: alphanumeric, -, _, @, .)"
        ));
    }

    Ok(())
}

/// Validate the shape of an anonymous session token taken from a cookie
///
/// Tokens are opaque; only length and alphabet are checked.
pub fn validate_session_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("session token cannot be empty"));
    }

    if token.len() > MAX_SESSION_TOKEN_LENGTH {
        return Err(anyhow!(
            "session token too long: {} chars (max: {})",
            token.len(),
            MAX_SESSION_TOKEN_LENGTH
        ));
    }

    if !token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(anyhow!("session token contains invalid characters"));
    }

    Ok(())
}

fn validate_text(what: &str, text: &str, max: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(anyhow!("{what} cannot be empty"));
    }

    if text.len() > max {
        return Err(anyhow!(
            "{what} too long: {} bytes (max: {max})",
            text.len()
        ));
    }

    if text
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err(anyhow!("{what} contains control characters"));
    }

    Ok(())
}

/// Validate a user chat message
pub fn validate_message(message: &str) -> Result<()> {
    validate_text("message", message, MAX_MESSAGE_LENGTH)
}

/// Validate a previous assistant reply echoed back by the client
pub fn validate_previous_reply(reply: &str) -> Result<()> {
    validate_text("previous_reply", reply, MAX_REPLY_LENGTH)
}

/// Validate one client-supplied history entry and return its role
pub fn validate_history_entry(role: &str, content: &str) -> Result<Role> {
    let role: Role = role.parse()?;
    let max = match role {
        Role::User => MAX_MESSAGE_LENGTH,
        Role::Assistant => MAX_REPLY_LENGTH,
    };
    validate_text("history content", content, max)?;
    Ok(role)
}

/// Validate the length of a client-supplied history
pub fn validate_history_len(len: usize, capacity: usize) -> Result<()> {
    if len > capacity {
        return Err(anyhow!(
            "history too long: {len} turns (max: {capacity})"
        ));
    }
    Ok(())
}

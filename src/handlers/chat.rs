//! Chat API Handlers
//!
//! Turns, deepen requests and memory resets. Every handler resolves the
//! caller first so a freshly minted session cookie is returned even when the
//! provider or quota refuses the request. Malformed input leaves no trace,
//! cookies included.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};

use super::session::SetCookies;
use super::state::AppState;
use super::types::{ChatRequest, ChatResponse, DeepenRequest, HistoryEntry, MessageResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::identity::ResolvedIdentity;
use crate::memory::ConversationTurn;
use crate::validation;

/// Unwrap a JSON body, turning extractor rejections into 400s
pub(super) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::invalid("body", rejection.body_text()))
}

/// Validate client-supplied history into turns
fn history_turns(
    entries: Vec<HistoryEntry>,
    capacity: usize,
) -> Result<Vec<ConversationTurn>, AppError> {
    validation::validate_history_len(entries.len(), capacity).map_validation_err("history")?;
    entries
        .into_iter()
        .map(|entry| {
            let role = validation::validate_history_entry(&entry.role, &entry.content)
                .map_validation_err("history")?;
            Ok(ConversationTurn {
                role,
                content: entry.content,
            })
        })
        .collect()
}

/// Attach cookies to a handler result
pub(super) fn respond<T: IntoResponse>(
    mut cookies: SetCookies,
    resolved: &ResolvedIdentity,
    result: Result<T, AppError>,
) -> Response {
    match result {
        Ok(body) => (cookies, body).into_response(),
        Err(err @ AppError::InvalidInput { .. }) => err.into_response(),
        Err(err) => {
            cookies.observe_error(resolved, &err);
            (cookies, err).into_response()
        }
    }
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let resolved = state.resolver().resolve(&headers);
    let mut cookies = SetCookies::for_request(&resolved, state.config().identity.secure_cookies);

    let result = async {
        let req = json_body(payload)?;
        validation::validate_message(&req.message).map_validation_err("message")?;
        let history = history_turns(req.history, state.orchestrator().memory().capacity())?;

        let outcome = state
            .orchestrator()
            .submit_turn(
                &resolved.identity,
                resolved.lockout_marker,
                &req.message,
                history,
            )
            .await?;
        Ok::<_, AppError>(outcome)
    }
    .await;

    let result = result.map(|outcome| {
        cookies.observe_quota(&resolved, &outcome.quota);
        Json(ChatResponse {
            response: outcome.response,
            message_id: outcome.message_id,
            remaining: outcome.quota.remaining,
        })
    });
    respond(cookies, &resolved, result)
}

/// POST /api/chat/deepen
pub async fn deepen(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeepenRequest>, JsonRejection>,
) -> Response {
    let resolved = state.resolver().resolve(&headers);
    let mut cookies = SetCookies::for_request(&resolved, state.config().identity.secure_cookies);

    let result = async {
        let req = json_body(payload)?;
        validation::validate_previous_reply(&req.previous_reply)
            .map_validation_err("previous_reply")?;
        validation::validate_message(&req.message).map_validation_err("message")?;

        let outcome = state
            .orchestrator()
            .deepen(
                &resolved.identity,
                resolved.lockout_marker,
                &req.previous_reply,
                &req.message,
            )
            .await?;
        Ok::<_, AppError>(outcome)
    }
    .await;

    let result = result.map(|outcome| {
        cookies.observe_quota(&resolved, &outcome.quota);
        Json(ChatResponse {
            response: outcome.response,
            message_id: outcome.message_id,
            remaining: outcome.quota.remaining,
        })
    });
    respond(cookies, &resolved, result)
}

/// POST /api/chat/clear
pub async fn clear(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let resolved = state.resolver().resolve(&headers);
    let cookies = SetCookies::for_request(&resolved, state.config().identity.secure_cookies);

    state.orchestrator().clear_memory(&resolved.identity);
    respond(
        cookies,
        &resolved,
        Ok(Json(MessageResponse::new("Conversation memory cleared"))),
    )
}

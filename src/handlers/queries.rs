//! Query Quota API Handlers
//!
//! Status, manual acknowledgement and the cookie utility endpoints.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};

use super::chat::respond;
use super::session::SetCookies;
use super::state::AppState;
use super::types::{MessageResponse, QueryStatusResponse, RecordResponse, SessionIdResponse};
use crate::constants::{LOCKOUT_COOKIE, SESSION_COOKIE};
use crate::errors::AppError;
use crate::identity::SessionToken;

/// GET /api/queries/status
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let resolved = state.resolver().resolve(&headers);
    let mut cookies = SetCookies::for_request(&resolved, state.config().identity.secure_cookies);

    let result = state
        .orchestrator()
        .status(&resolved.identity)
        .map_err(AppError::from)
        .map(|quota| {
            cookies.observe_quota(&resolved, &quota);
            Json(QueryStatusResponse::from(quota))
        });
    respond(cookies, &resolved, result)
}

/// POST /api/queries/record
pub async fn record(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let resolved = state.resolver().resolve(&headers);
    let mut cookies = SetCookies::for_request(&resolved, state.config().identity.secure_cookies);

    let result = state
        .orchestrator()
        .record(&resolved.identity, resolved.lockout_marker)
        .await
        .map_err(AppError::from)
        .map(|quota| {
            cookies.observe_quota(&resolved, &quota);
            Json(RecordResponse::from(quota))
        });
    respond(cookies, &resolved, result)
}

/// GET /api/queries/session-id
///
/// Mints a token without binding it to the caller.
pub async fn session_id() -> Json<SessionIdResponse> {
    Json(SessionIdResponse {
        session_id: SessionToken::mint().as_str().to_string(),
    })
}

/// POST /api/queries/clear-cookies
pub async fn clear_cookies(State(state): State<AppState>) -> Response {
    let mut cookies = SetCookies::new(state.config().identity.secure_cookies);
    cookies.expire(SESSION_COOKIE);
    cookies.expire(LOCKOUT_COOKIE);
    (cookies, Json(MessageResponse::new("Cookies cleared"))).into_response()
}

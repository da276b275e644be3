//! Structured error types for the HTTP boundary
//!
//! Components raise their own `thiserror` enums (`LedgerError`, `ProviderError`);
//! handlers convert them into `AppError`, which owns the status code, the
//! machine-readable code and the JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::ProviderError;
use crate::quota::LedgerError;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Queries left for the caller (quota errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,

    /// Whether the caller must register to continue (quota errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_registration: Option<bool>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation Errors (400)
    InvalidInput { field: String, reason: String },

    // Quota Errors (429)
    QuotaExceeded {
        limit: u32,
        used: u32,
        requires_registration: bool,
    },

    // Upstream Errors (502)
    Provider(String),

    // Internal Errors (500)
    StorageError(String),
    SerializationError(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::StorageError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get detailed error message
    ///
    /// Internal failures stay opaque; their detail goes to the log, not the client.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::QuotaExceeded {
                limit,
                requires_registration: true,
                ..
            } => format!("You have used all {limit} free queries. Register to keep talking."),
            Self::QuotaExceeded { limit, .. } => {
                format!("You have reached your daily limit of {limit} queries. Come back tomorrow.")
            }
            Self::Provider(_) => "The assistant is unavailable right now. Please try again.".to_string(),
            Self::StorageError(_) => "Storage error".to_string(),
            Self::SerializationError(_) => "Serialization error".to_string(),
            Self::Internal(_) => "Internal error".to_string(),
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        let (remaining, requires_registration) = match self {
            Self::QuotaExceeded {
                requires_registration,
                ..
            } => (Some(0), Some(*requires_registration)),
            _ => (None, None),
        };
        let details = match self {
            Self::QuotaExceeded { used, limit, .. } => Some(format!("used={used} limit={limit}")),
            _ => None,
        };

        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details,
            remaining,
            requires_registration,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(detail) => write!(f, "provider error: {detail}"),
            Self::StorageError(detail) => write!(f, "storage error: {detail}"),
            Self::SerializationError(detail) => write!(f, "serialization error: {detail}"),
            Self::Internal(err) => write!(f, "internal error: {err}"),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Convert from anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Encode(e) | LedgerError::Decode(e) => Self::SerializationError(e),
            other => Self::StorageError(other.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        }
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::invalid("message", "empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::QuotaExceeded {
                limit: 5,
                used: 5,
                requires_registration: true
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Provider("timeout".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::StorageError("failed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_quota_response_carries_remaining_and_registration() {
        let err = AppError::QuotaExceeded {
            limit: 5,
            used: 5,
            requires_registration: true,
        };
        let body = err.to_response();
        assert_eq!(body.code, "QUOTA_EXCEEDED");
        assert_eq!(body.remaining, Some(0));
        assert_eq!(body.requires_registration, Some(true));
        assert!(body.message.contains("Register"));
    }

    #[test]
    fn test_daily_quota_message() {
        let err = AppError::QuotaExceeded {
            limit: 10,
            used: 10,
            requires_registration: false,
        };
        assert!(err.message().contains("daily limit of 10"));
        assert_eq!(err.to_response().requires_registration, Some(false));
    }

    #[test]
    fn test_provider_detail_not_exposed() {
        let err = AppError::Provider("401 from upstream: bad key sk-123".to_string());
        let body = err.to_response();
        assert!(!body.message.contains("sk-123"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_non_quota_errors_omit_quota_fields() {
        let json = serde_json::to_value(AppError::invalid("message", "empty").to_response())
            .unwrap();
        assert!(json.get("remaining").is_none());
        assert!(json.get("requires_registration").is_none());
    }

    #[test]
    fn test_map_validation_err() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("too long"));
        match result.map_validation_err("message") {
            Err(AppError::InvalidInput { field, reason }) => {
                assert_eq!(field, "message");
                assert_eq!(reason, "too long");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

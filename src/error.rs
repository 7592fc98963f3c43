//! Error types for Yardgate
//!
//! Domain errors live next to the component that raises them
//! (`SessionError`, `StateError`, `ProviderError`, ...). Anything that
//! reaches an HTTP handler boundary is converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::{CredentialError, SessionError};

/// Application-wide error type
///
/// Messages returned to clients are deliberately generic. The
/// detailed cause is logged before the response is built.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("unauthorized")]
    Unauthorized,

    /// Wrong user id or password (401)
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Malformed request (400)
    #[error("invalid request")]
    Validation(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session cookie could not be issued (500)
    #[error("session creation failed")]
    SessionCreation(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<CredentialError> for AppError {
    fn from(_: CredentialError) -> Self {
        AppError::InvalidCredentials
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Encoding(msg) => AppError::SessionCreation(msg),
            _ => AppError::Unauthorized,
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "invalid_credentials",
            ),
            AppError::Validation(detail) => {
                tracing::debug!(%detail, "Rejected malformed request");
                (StatusCode::BAD_REQUEST, self.to_string(), "validation")
            }
            AppError::Config(msg) => {
                tracing::error!(%msg, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                    "config",
                )
            }
            AppError::SessionCreation(detail) => {
                tracing::error!(%detail, "Failed to issue session cookie");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    self.to_string(),
                    "session_creation",
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "internal",
                )
            }
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

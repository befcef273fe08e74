//! Error types for the social core
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Reason a state-changing request collided with existing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Sender and receiver are the same user
    SelfRequest,
    /// A friend edge already links the pair
    AlreadyFriends,
    /// A pending request already exists between the pair
    DuplicateRequest,
    /// The request has already been accepted or rejected
    NotPending,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfRequest => "self_request",
            Self::AlreadyFriends => "already_friends",
            Self::DuplicateRequest => "duplicate_request",
            Self::NotPending => "not_pending",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::SelfRequest => "cannot send a friend request to yourself",
            Self::AlreadyFriends => "users are already friends",
            Self::DuplicateRequest => "a pending friend request already exists",
            Self::NotPending => "friend request is not pending",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Application-wide error type
///
/// Validation and conflict errors are terminal for the caller; database
/// and internal errors surface as a generic 500 without leaking details.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found, or not owned by the caller (404)
    #[error("Resource not found")]
    NotFound,

    /// Caller identity missing or unusable (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Malformed identifier or missing field (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request collides with current state (409)
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
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
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Conflict(kind) => (StatusCode::CONFLICT, kind.to_string(), kind.as_str()),
            AppError::Database(error) => {
                tracing::error!(%error, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    "database",
                )
            }
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(error) => {
                tracing::error!(error = %error, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "internal",
                )
            }
        };

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
            "code": error_type,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::roles::UnknownRole;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (validation failed before any write)
    BadRequest(String),

    // 401 Unauthorized (missing/invalid credentials)
    AuthError(String),

    // 403 Forbidden (actor lacks required role, level or ownership)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (optimistic state check failed, duplicate username)
    Conflict(String),

    // 422 Unprocessable Entity (entity configuration makes the operation
    // impossible, e.g. finalizing a zero-point exam)
    UnprocessableConfig(String),
}

impl AppError {
    /// Session mutation attempted after it reached a terminal state.
    pub fn session_completed() -> Self {
        AppError::Conflict("Session already completed".to_string())
    }

    /// Candidate-side write after the written answers were submitted.
    pub fn already_submitted() -> Self {
        AppError::Conflict("Written answers already submitted".to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableConfig(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// A role identifier outside the closed set is a hard denial, not a crash.
impl From<UnknownRole> for AppError {
    fn from(err: UnknownRole) -> Self {
        AppError::Forbidden(err.to_string())
    }
}

// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable (pool exhausted, connection dropped)
    ServiceUnavailable(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (attempt owned by another user)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., advancing a submitted attempt)
    Conflict(String),

    // 402 Payment Required
    QuotaExceeded(String),

    // 403 Forbidden
    AttemptLimitReached(String),

    // 410 Gone
    TimeExpired(String),

    // 422 Unprocessable Entity
    NoQuestions(String),

    // 409 Conflict (quiz not published)
    QuizInactive(String),
}

impl AppError {
    /// Stable machine-readable kind, sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::ServiceUnavailable(_) => "transient_store",
            AppError::BadRequest(_) => "validation",
            AppError::AuthError(_) => "unauthenticated",
            AppError::Forbidden(_) => "authorization",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "state_conflict",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::AttemptLimitReached(_) => "attempt_limit_reached",
            AppError::TimeExpired(_) => "time_expired",
            AppError::NoQuestions(_) => "no_questions",
            AppError::QuizInactive(_) => "quiz_inactive",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AttemptLimitReached(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::QuizInactive(_) => StatusCode::CONFLICT,
            AppError::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::TimeExpired(_) => StatusCode::GONE,
            AppError::NoQuestions(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
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
        let status = self.status();
        let kind = self.kind();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                "Service temporarily unavailable".to_string()
            }
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::QuotaExceeded(msg)
            | AppError::AttemptLimitReached(msg)
            | AppError::TimeExpired(msg)
            | AppError::NoQuestions(msg)
            | AppError::QuizInactive(msg) => msg,
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError`.
/// Connection-level failures are transient; everything else is internal.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            _ => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

//! Request failure taxonomy
//!
//! Every failure a handler can produce is rendered as the same JSON envelope
//! (`success: false`, human `error`, machine `code`, optional `details`) so
//! clients branch on `code` rather than on message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Everything a request can fail with
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad or missing input (400); carries the stable machine code
    #[error("{message}")]
    Validation {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Missing or invalid credentials (401)
    #[error("{message}")]
    Unauthorized {
        code: String,
        message: String,
        redirect: Option<String>,
    },

    /// Resource not found or not owned by the caller (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Wrong HTTP method on a method-bound endpoint (405)
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Per-IP rate limit exceeded (429)
    #[error("Too many requests")]
    RateLimited,

    /// Upstream fetch could not be dispatched (502); payload is the transport error
    #[error("Request failed: {0}")]
    UpstreamUnreachable(String),

    /// Upstream connection succeeded but the body read failed (500)
    #[error("Failed to read response: {0}")]
    UpstreamRead(String),

    /// Upstream response exceeded the configured size cap (400)
    #[error("{0}")]
    ResponseTooLarge(String),

    /// Unexpected fault; the payload is logged, never sent to the client (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQL layer failure (500)
    #[error("Database error: {0}")]
    Database(String),

    /// The runtime configuration is unusable (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required backing service is down (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Validation failure with a machine code
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Validation failure with a machine code and a details object
    pub fn validation_with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    /// Authentication failure (`unauthorized` when no credential was offered,
    /// `invalid_token` when one was offered and rejected)
    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.into(),
            message: message.into(),
            redirect: None,
        }
    }

    /// Authentication failure carrying a client-side redirect hint
    pub fn unauthorized_with_redirect(
        code: impl Into<String>,
        message: impl Into<String>,
        redirect: impl Into<String>,
    ) -> Self {
        Self::Unauthorized {
            code: code.into(),
            message: message.into(),
            redirect: Some(redirect.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// JSON envelope every failure is rendered as
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Always `false`; mirrors the `success: true` of tool results
    pub success: bool,
    /// Human-readable error message
    pub error: String,
    /// Stable machine-readable code for programmatic handling
    pub code: String,
    /// Extra structured context, attached to some validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Client-side redirect hint for unauthenticated browser callers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl ErrorResponse {
    /// Envelope with `success` pinned to `false`
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
            details: None,
            redirect: None,
        }
    }

    /// Attach a details object
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Add a redirect hint
    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, loggable) = match &self {
            AppError::Validation { .. } => (StatusCode::BAD_REQUEST, false),
            AppError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, false),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, false),
            AppError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, false),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, false),
            AppError::UpstreamUnreachable(_) => (StatusCode::BAD_GATEWAY, true),
            AppError::UpstreamRead(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::ResponseTooLarge(_) => (StatusCode::BAD_REQUEST, false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, true),
        };

        // Client mistakes are not worth a log line; server faults are
        if loggable {
            error!(error = %self, "Request error");
        }

        let body = match self {
            AppError::Validation {
                code,
                message,
                details,
            } => {
                let mut body = ErrorResponse::new(message, code);
                body.details = details;
                body
            }
            AppError::Unauthorized {
                code,
                message,
                redirect,
            } => {
                let mut body = ErrorResponse::new(message, code);
                body.redirect = redirect;
                body
            }
            AppError::NotFound(message) => ErrorResponse::new(message, "not_found"),
            AppError::MethodNotAllowed => {
                ErrorResponse::new("Method not allowed", "method_not_allowed")
            }
            AppError::RateLimited => ErrorResponse::new(
                "Too many requests. Please try again later.",
                "rate_limited",
            ),
            AppError::UpstreamUnreachable(cause) => {
                ErrorResponse::new("Request failed", "request_failed")
                    .with_details(serde_json::json!({ "error": cause }))
            }
            AppError::UpstreamRead(cause) => {
                ErrorResponse::new("Failed to read response", "read_response_failed")
                    .with_details(serde_json::json!({ "error": cause }))
            }
            AppError::ResponseTooLarge(message) => {
                ErrorResponse::new(message, "response_too_large")
            }
            AppError::Internal(_) | AppError::Database(_) | AppError::Config(_) => {
                // Internal detail stays in the logs
                ErrorResponse::new("Internal server error", "internal_error")
            }
            AppError::ServiceUnavailable(message) => {
                ErrorResponse::new(message, "service_unavailable")
            }
        };

        (status, Json(body)).into_response()
    }
}

// Conversions for the library errors handlers bubble up with `?`

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            AppError::NotFound("Resource not found".to_string())
        } else {
            AppError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::validation("invalid_request_body", format!("Invalid request body: {err}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::validation("validation_error", err.to_string())
    }
}

/// Handler return type; the error side renders itself through [`IntoResponse`]
pub type AppResult<T> = Result<T, AppError>;

//! Error types for web handlers.
//!
//! This module bridges [`AuthError`] and HTTP responses. The body is always
//! `{"error": <client code>}`. The internal message travels in a response
//! extension ([`ErrorDetail`]) and is only copied into the body as `detail`
//! outside production (see [`crate::middleware::expose_error_detail`]).

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use passkey_idp_auth::AuthError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Client-facing error code
    code: &'static str,
    /// Internal message (never shown in production)
    detail: String,
    /// Seconds to wait before retrying (429 only)
    retry_after: Option<u64>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
            retry_after: None,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 `invalid_request` error.
    #[must_use]
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::from(AuthError::InvalidRequest { reason: detail.into() })
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &err {
            AuthError::TooManyAttempts { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        Self {
            status,
            code: err.client_code(),
            detail: err.to_string(),
            retry_after,
            source: None,
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.detail)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Client-facing error code.
    pub error: &'static str,
    /// Internal message, development only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Internal message attached to error responses as an extension.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    /// Client-facing code of the response.
    pub code: &'static str,
    /// Internal message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    detail = %self.detail,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    detail = %self.detail,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorBody {
            error: self.code,
            detail: None,
        };
        let mut response = (self.status, Json(body)).into_response();

        if let Some(secs) = self.retry_after {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(ErrorDetail {
            code: self.code,
            message: self.detail,
        });
        response
    }
}

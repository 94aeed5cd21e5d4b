//! Gateway error types.
//!
//! Every error maps to an explicit HTTP response via the `IntoResponse` impl.
//! Bodies are always `{error, message, timestamp}`; messages are fixed and
//! never echo token contents.

use crate::auth::FailureReason;
use crate::classifier::{classify, ErrorCode};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// Header carrying the machine-readable error code.
pub const AUTH_ERROR_HEADER: &str = "x-auth-error";

/// Seconds clients are asked to wait when the key set is unavailable.
pub const RETRY_AFTER_SECONDS: u64 = 5;

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - MethodNotAllowed: 405 Method Not Allowed
/// - MissingToken: 401 Unauthorized
/// - Rejected: per the error classifier (401, or 503 for an unreachable key set)
/// - Timeout: 408 Request Timeout
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token rejected: {0}")]
    Rejected(FailureReason),

    #[error("Request timed out")]
    Timeout,
}

impl GatewayError {
    /// Error code carried in the body and `X-Auth-Error`.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::MethodNotAllowed => ErrorCode::MethodNotAllowed,
            GatewayError::MissingToken => ErrorCode::MissingToken,
            GatewayError::Rejected(reason) => classify(*reason).code,
            GatewayError::Timeout => ErrorCode::RequestTimeout,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::MissingToken => StatusCode::UNAUTHORIZED,
            GatewayError::Rejected(reason) => classify(*reason).status,
            GatewayError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Fixed client-facing message; never echoes request content.
    pub fn message(&self) -> &'static str {
        match self {
            GatewayError::MethodNotAllowed => "Only GET and POST requests are allowed",
            GatewayError::MissingToken => "Missing or invalid Authorization header",
            GatewayError::Rejected(reason) => classify(*reason).message,
            GatewayError::Timeout => "Request took too long to complete. Please retry.",
        }
    }
}

impl From<FailureReason> for GatewayError {
    fn from(reason: FailureReason) -> Self {
        GatewayError::Rejected(reason)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
    timestamp: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(target: "gateway.errors", error = %self, "Signing keys unavailable");
        }

        let body = ErrorResponse {
            error: code.as_str(),
            message: self.message(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match status {
            StatusCode::METHOD_NOT_ALLOWED => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
            }
            StatusCode::UNAUTHORIZED => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECONDS));
            }
            _ => {}
        }

        if status != StatusCode::METHOD_NOT_ALLOWED {
            headers.insert(AUTH_ERROR_HEADER, HeaderValue::from_static(code.as_str()));
        }

        response
    }
}

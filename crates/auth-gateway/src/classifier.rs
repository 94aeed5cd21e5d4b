//! Error classifier: maps verification failures to client-facing errors.
//!
//! The mapping is fixed and total. Issuer and audience mismatches keep
//! distinct codes so operators can tell misconfiguration from forgery.

use crate::auth::FailureReason;
use axum::http::StatusCode;
use std::fmt;

/// Stable error codes carried in `X-Auth-Error` and the `error` body field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TokenExpired,
    InvalidToken,
    InvalidIssuer,
    InvalidAudience,
    KeyNotFound,
    MultipleKeysFound,
    KeySetUnavailable,
    MissingToken,
    MethodNotAllowed,
    RequestTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::InvalidIssuer => "INVALID_ISSUER",
            ErrorCode::InvalidAudience => "INVALID_AUDIENCE",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::MultipleKeysFound => "MULTIPLE_KEYS_FOUND",
            ErrorCode::KeySetUnavailable => "KEY_SET_UNAVAILABLE",
            ErrorCode::MissingToken => "MISSING_TOKEN",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub code: ErrorCode,
    pub status: StatusCode,
    pub message: &'static str,
}

/// Classify a verification failure.
///
/// Every reason yields 401 except an unreachable key set, which is a 503 so
/// clients retry rather than discard their credentials.
pub fn classify(reason: FailureReason) -> Classification {
    let (code, message) = match reason {
        FailureReason::Expired => (
            ErrorCode::TokenExpired,
            "Token has expired. Please refresh your credentials.",
        ),
        FailureReason::Malformed | FailureReason::InvalidSignature => (
            ErrorCode::InvalidToken,
            "Token is malformed or its signature is invalid",
        ),
        FailureReason::IssuerMismatch => (
            ErrorCode::InvalidIssuer,
            "Token issuer does not match the expected issuer",
        ),
        FailureReason::AudienceMismatch => (
            ErrorCode::InvalidAudience,
            "Token audience does not match this deployment",
        ),
        FailureReason::NoMatchingKey => (
            ErrorCode::KeyNotFound,
            "No published signing key matches the token key id",
        ),
        FailureReason::AmbiguousKey => (
            ErrorCode::MultipleKeysFound,
            "Multiple signing keys match the token key id",
        ),
        FailureReason::KeySetUnavailable => {
            return Classification {
                code: ErrorCode::KeySetUnavailable,
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "Signing keys are temporarily unavailable. Please retry.",
            };
        }
        FailureReason::Other => (ErrorCode::InvalidToken, "Token could not be verified"),
    };

    Classification {
        code,
        status: StatusCode::UNAUTHORIZED,
        message,
    }
}

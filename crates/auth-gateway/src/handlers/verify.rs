//! Request handler for token verification.
//!
//! Terminates one inbound request: checks the method, extracts the bearer
//! token, runs the verifier and answers with identity headers or a
//! classified error.

use crate::auth::{Claims, FailureReason, VerificationOutcome};
use crate::classifier::classify;
use crate::errors::GatewayError;
use crate::observability::metrics::record_token_verification;
use crate::routes::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-user-email");
pub const USER_VERIFIED_HEADER: HeaderName = HeaderName::from_static("x-user-verified");

/// Body of a successful verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Handler for every path other than the operational endpoints.
///
/// ## Response
///
/// - 405 for methods other than GET and POST, before any token handling
/// - 401 `MISSING_TOKEN` when there is no `Authorization: Bearer <token>`
/// - 200 with `X-User-ID`, `X-User-Email` and `X-User-Verified` on success
/// - 401 (or 503 if the key set is unreachable) with `X-Auth-Error` otherwise
#[instrument(skip_all, name = "gateway.handlers.verify", fields(method = %method))]
pub async fn verify_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    if method != Method::GET && method != Method::POST {
        tracing::debug!(target: "gateway.handlers.verify", "Method not allowed");
        return Err(GatewayError::MethodNotAllowed);
    }

    let token = extract_bearer_token(&headers).ok_or_else(|| {
        tracing::debug!(
            target: "gateway.handlers.verify",
            "Missing or malformed Authorization header"
        );
        GatewayError::MissingToken
    })?;

    let start = Instant::now();
    let outcome = state
        .verifier
        .verify(token.expose_secret(), &state.expected, Utc::now().timestamp())
        .await;

    match outcome {
        VerificationOutcome::Verified(claims) => {
            record_token_verification("verified", None, start.elapsed());
            identity_response(&claims)
        }
        VerificationOutcome::Rejected(reason) => {
            let classification = classify(reason);
            record_token_verification(
                "rejected",
                Some(classification.code.as_str()),
                start.elapsed(),
            );
            tracing::info!(
                target: "gateway.handlers.verify",
                reason = %reason,
                error_code = %classification.code,
                "Token rejected"
            );
            Err(reason.into())
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched exactly; an empty or blank token counts as absent.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();

    if token.is_empty() {
        return None;
    }

    Some(SecretString::from(token.to_string()))
}

/// Build the 200 response carrying the advisory identity headers.
fn identity_response(claims: &Claims) -> Result<Response, GatewayError> {
    let user_id = HeaderValue::from_str(&claims.sub).map_err(|_| {
        tracing::warn!(target: "gateway.handlers.verify", "Subject is not a valid header value");
        GatewayError::Rejected(FailureReason::Other)
    })?;
    let email = HeaderValue::from_str(claims.email_or_empty()).map_err(|_| {
        tracing::warn!(target: "gateway.handlers.verify", "Email is not a valid header value");
        GatewayError::Rejected(FailureReason::Other)
    })?;
    let verified = HeaderValue::from_static(if claims.is_email_verified() {
        "true"
    } else {
        "false"
    });

    tracing::debug!(
        target: "gateway.handlers.verify",
        "Token verified, forwarding identity headers"
    );

    let mut response = (
        StatusCode::OK,
        Json(VerifyResponse {
            success: true,
            message: "Token is valid",
        }),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(USER_ID_HEADER, user_id);
    headers.insert(USER_EMAIL_HEADER, email);
    headers.insert(USER_VERIFIED_HEADER, verified);

    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Audience;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn claims(sub: &str, email: Option<&str>, verified: Option<bool>) -> Claims {
        Claims {
            sub: sub.to_string(),
            iss: "https://securetoken.google.com/demo-project".to_string(),
            aud: Audience::Single("demo-project".to_string()),
            exp: 1_700_003_600,
            iat: None,
            nbf: None,
            email: email.map(ToString::to_string),
            email_verified: verified,
        }
    }

    #[test]
    fn test_extract_bearer_token() {
        let token = extract_bearer_token(&headers_with("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token.expose_secret(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        assert!(extract_bearer_token(&headers_with("Basic dXNlcjpwYXNz")).is_none());
        assert!(extract_bearer_token(&headers_with("bearer abc.def.ghi")).is_none());
        assert!(extract_bearer_token(&headers_with("Bearerabc.def.ghi")).is_none());
    }

    #[test]
    fn test_extract_bearer_token_blank() {
        assert!(extract_bearer_token(&headers_with("Bearer ")).is_none());
        assert!(extract_bearer_token(&headers_with("Bearer    ")).is_none());
    }

    #[test]
    fn test_identity_response_headers() {
        let response =
            identity_response(&claims("user-1", Some("alice@example.com"), Some(true))).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-user-id").unwrap(), "user-1");
        assert_eq!(
            response.headers().get("x-user-email").unwrap(),
            "alice@example.com"
        );
        assert_eq!(response.headers().get("x-user-verified").unwrap(), "true");
    }

    #[test]
    fn test_identity_response_defaults() {
        let response = identity_response(&claims("user-1", None, None)).unwrap();

        assert_eq!(response.headers().get("x-user-email").unwrap(), "");
        assert_eq!(response.headers().get("x-user-verified").unwrap(), "false");
    }

    #[test]
    fn test_identity_response_rejects_unrepresentable_subject() {
        let result = identity_response(&claims("user\n1", None, None));
        assert!(matches!(
            result,
            Err(GatewayError::Rejected(FailureReason::Other))
        ));
    }
}

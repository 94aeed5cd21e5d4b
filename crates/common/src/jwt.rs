//! JWT utilities shared by the gateway crates.
//!
//! This module provides the parts of token validation that do not depend on
//! key material:
//! - Size limits for DoS prevention
//! - Clock skew constants
//! - Header decoding (`kid` and `alg`) without signature verification
//! - Time-claim checks (`exp`, `iat`, `nbf`) against an explicit `now`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header values are only used to select a key from a trusted key set; the
//!   token MUST still be verified afterwards
//! - Error messages are intentionally generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_token_header, validate_exp_at, validate_iat_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_token_header(token)?;
//! let key = resolver.resolve(&header.kid).await?;
//!
//! // After signature verification
//! validate_exp_at(claims.exp, now)?;
//! validate_iat_at(claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// - Typical identity-provider ID tokens are 900-1200 bytes (RS256 signature)
/// - 8KB leaves room for custom claims while bounding base64 decode cost
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 seconds).
///
/// Applied to `iat` and `nbf` being in the future. Hosts are expected to be
/// NTP-synchronised, so only a few seconds of drift are tolerated by default.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Guards against configuration that would make the time checks meaningless.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during key-independent JWT validation.
///
/// Note: Display messages are intentionally generic. Detailed information is
/// logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid compact JWS structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header is missing the `kid` field.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token header is missing the `alg` field.
    #[error("The access token is invalid or expired")]
    MissingAlg,

    /// Token `exp` claim is not after `now`.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token `nbf` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    NotYetValid,
}

// =============================================================================
// Header Types
// =============================================================================

/// The subset of a JWS header needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key identifier used to look up the key in the published key set.
    pub kid: String,

    /// Declared signing algorithm (e.g. `RS256`, `EdDSA`).
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    alg: Option<serde_json::Value>,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the `kid` and `alg` from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
///
/// # Errors
///
/// Returns `JwtValidationError` variants:
/// - `TokenTooLarge` - Token exceeds size limit
/// - `MalformedToken` - Wrong number of segments, bad base64, or invalid JSON
/// - `MissingKid` - Header has no non-empty string `kid`
/// - `MissingAlg` - Header has no non-empty string `alg`
pub fn decode_token_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    // Only non-empty strings count
    let kid = header
        .kid
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    let alg = header
        .alg
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlg)?;

    Ok(TokenHeader { kid, alg })
}

/// Validate the `exp` claim against `now`.
///
/// Expiry is strict: a token whose `exp` equals `now` is already expired.
/// No skew is applied in the token's favour.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `exp <= now`.
pub fn validate_exp_at(exp: i64, now: i64) -> Result<(), JwtValidationError> {
    if exp <= now {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` more than `clock_skew` after `now`, which could
/// indicate token pre-generation or clock drift.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Validate the `nbf` (not-before) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(
    nbf: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let max_nbf = now.saturating_add(skew_secs(clock_skew));

    if nbf > max_nbf {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            max_allowed = max_nbf,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    // -------------------------------------------------------------------------
    // decode_token_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_header_valid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);

        let header = decode_token_header(&token).unwrap();
        assert_eq!(header.kid, "key-01");
        assert_eq!(header.alg, "RS256");
    }

    #[test]
    fn test_decode_header_wrong_segment_count() {
        assert!(matches!(
            decode_token_header("not.a.valid.jwt.format"),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            decode_token_header("only.two"),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            decode_token_header(""),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_decode_header_empty_segments() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","kid":"k"}"#);
        // alg:none style token with an empty signature segment
        let token = format!("{header_b64}.payload.");
        assert!(matches!(
            decode_token_header(&token),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            decode_token_header(".payload.signature"),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_decode_header_invalid_base64() {
        let result = decode_token_header("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_decode_header_invalid_json() {
        let token = token_with_header("not-json");
        assert!(matches!(
            decode_token_header(&token),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_decode_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            decode_token_header(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        ));
    }

    #[test]
    fn test_decode_header_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"EdDSA","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        let header = decode_token_header(&token).unwrap();
        assert_eq!(header.kid, "key");
    }

    #[test]
    fn test_decode_header_missing_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);
        assert!(matches!(
            decode_token_header(&token),
            Err(JwtValidationError::MissingKid)
        ));
    }

    #[test]
    fn test_decode_header_non_string_or_empty_kid() {
        for header in [
            r#"{"alg":"RS256","kid":12345}"#,
            r#"{"alg":"RS256","kid":null}"#,
            r#"{"alg":"RS256","kid":""}"#,
        ] {
            let token = token_with_header(header);
            assert!(
                matches!(
                    decode_token_header(&token),
                    Err(JwtValidationError::MissingKid)
                ),
                "header {header} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_header_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key-01"}"#);
        assert!(matches!(
            decode_token_header(&token),
            Err(JwtValidationError::MissingAlg)
        ));
    }

    // -------------------------------------------------------------------------
    // Time claim Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_exp_at_boundary() {
        let now = 1_700_000_000_i64;

        assert!(validate_exp_at(now + 1, now).is_ok());
        assert!(matches!(
            validate_exp_at(now, now),
            Err(JwtValidationError::Expired)
        ));
        assert!(matches!(
            validate_exp_at(now - 3600, now),
            Err(JwtValidationError::Expired)
        ));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        // iat == now + skew is the last accepted value
        assert!(validate_iat_at(now + 5, DEFAULT_CLOCK_SKEW, now).is_ok());

        // iat == now + skew + 1 is the first rejected value
        assert!(matches!(
            validate_iat_at(now + 6, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_iat_at_zero_skew() {
        let now = 1_700_000_000_i64;

        assert!(validate_iat_at(now, Duration::ZERO, now).is_ok());
        assert!(validate_iat_at(now - 60, Duration::ZERO, now).is_ok());
        assert!(matches!(
            validate_iat_at(now + 1, Duration::ZERO, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_nbf_at() {
        let now = 1_700_000_000_i64;

        assert!(validate_nbf_at(now - 10, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert!(validate_nbf_at(now + 5, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert!(matches!(
            validate_nbf_at(now + 60, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::NotYetValid)
        ));
    }

    #[test]
    fn test_clock_skew_constants() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
        assert!(DEFAULT_CLOCK_SKEW <= MAX_CLOCK_SKEW);
    }
}

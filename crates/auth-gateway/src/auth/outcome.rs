//! Result of verifying one token.

use crate::auth::claims::Claims;
use std::fmt;

/// Why a token was rejected.
///
/// Carried opaquely from the verifier to the error classifier, which owns the
/// mapping to error codes and HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// `exp` has passed, or `iat`/`nbf` lie beyond the clock skew allowance.
    Expired,
    /// Not a well-formed compact token, or an unsupported algorithm.
    Malformed,
    /// Signature does not verify under the resolved key.
    InvalidSignature,
    /// `iss` differs from the expected issuer.
    IssuerMismatch,
    /// `aud` does not equal (or contain) the expected audience.
    AudienceMismatch,
    /// No published key carries the token's `kid`, even after a refetch.
    NoMatchingKey,
    /// The published key set holds conflicting keys for the token's `kid`.
    AmbiguousKey,
    /// The key set could not be fetched from the identity provider.
    KeySetUnavailable,
    /// Anything else, e.g. unusable key material.
    Other,
}

impl FailureReason {
    /// Stable snake_case name for logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Expired => "expired",
            FailureReason::Malformed => "malformed",
            FailureReason::InvalidSignature => "invalid_signature",
            FailureReason::IssuerMismatch => "issuer_mismatch",
            FailureReason::AudienceMismatch => "audience_mismatch",
            FailureReason::NoMatchingKey => "no_matching_key",
            FailureReason::AmbiguousKey => "ambiguous_key",
            FailureReason::KeySetUnavailable => "key_set_unavailable",
            FailureReason::Other => "other",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`TokenVerifier::verify`](crate::auth::TokenVerifier::verify).
///
/// Exactly one of the two holds; there is no partially verified state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(Claims),
    Rejected(FailureReason),
}

impl From<Result<Claims, FailureReason>> for VerificationOutcome {
    fn from(result: Result<Claims, FailureReason>) -> Self {
        match result {
            Ok(claims) => VerificationOutcome::Verified(claims),
            Err(reason) => VerificationOutcome::Rejected(reason),
        }
    }
}

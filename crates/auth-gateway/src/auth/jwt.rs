//! Token verifier for identity-provider ID tokens.
//!
//! Verifies incoming JWTs using public keys resolved from the provider's
//! published key set.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256/RS384/RS512 and EdDSA are accepted; `none` and HMAC never reach key resolution
//! - Claims are checked in a fixed order: signature, issuer, audience, time
//! - Time checks use the caller-supplied `now`, never a hidden clock

use crate::auth::claims::Claims;
use crate::auth::jwks::{Jwk, KeyResolver, ResolveError};
use crate::auth::outcome::{FailureReason, VerificationOutcome};
use common::jwt::{decode_token_header, validate_exp_at, validate_iat_at, validate_nbf_at};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Issuer and audience a token must carry to be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedClaims {
    pub issuer: String,
    pub audience: String,
}

/// Verifies tokens against keys from a [`KeyResolver`].
pub struct TokenVerifier {
    /// Resolver for signing keys.
    resolver: Arc<KeyResolver>,

    /// Allowance for `iat`/`nbf` lying in the future.
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a new token verifier.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Resolver for the provider's signing keys
    /// * `clock_skew` - Tolerance for `iat`/`nbf` ahead of `now`
    pub fn new(resolver: Arc<KeyResolver>, clock_skew: Duration) -> Self {
        Self {
            resolver,
            clock_skew,
        }
    }

    /// Verify a token and return its claims or the reason it was rejected.
    ///
    /// # Checks, in order
    ///
    /// 1. Structure and size of the compact token
    /// 2. Supported algorithm, then key resolution by `kid`
    /// 3. Signature under the resolved key
    /// 4. `iss` equals `expected.issuer`
    /// 5. `aud` equals or contains `expected.audience`
    /// 6. `exp` after `now`; `iat`/`nbf` not beyond `now` plus skew
    ///
    /// The first failing check decides the reason.
    #[instrument(skip_all)]
    pub async fn verify(
        &self,
        token: &str,
        expected: &ExpectedClaims,
        now: i64,
    ) -> VerificationOutcome {
        let outcome = VerificationOutcome::from(self.verify_token(token, expected, now).await);

        match &outcome {
            VerificationOutcome::Verified(_) => {
                tracing::debug!(target: "gateway.auth.jwt", "Token verified");
            }
            VerificationOutcome::Rejected(reason) => {
                tracing::debug!(target: "gateway.auth.jwt", reason = %reason, "Token rejected");
            }
        }

        outcome
    }

    async fn verify_token(
        &self,
        token: &str,
        expected: &ExpectedClaims,
        now: i64,
    ) -> Result<Claims, FailureReason> {
        // 1. Header (includes size check via common::jwt)
        let header = decode_token_header(token).map_err(|e| {
            tracing::debug!(target: "gateway.auth.jwt", error = ?e, "Token header decoding failed");
            FailureReason::Malformed
        })?;

        // 2. Algorithm allow-list before any key lookup
        let algorithm = supported_algorithm(&header.alg).ok_or_else(|| {
            tracing::debug!(
                target: "gateway.auth.jwt",
                alg = %header.alg,
                "Unsupported token algorithm"
            );
            FailureReason::Malformed
        })?;

        let jwk = self
            .resolver
            .resolve(&header.kid)
            .await
            .map_err(|e| match e {
                ResolveError::NotFound => FailureReason::NoMatchingKey,
                ResolveError::Ambiguous { .. } => FailureReason::AmbiguousKey,
                ResolveError::Unavailable(_) => FailureReason::KeySetUnavailable,
            })?;

        // 3. Signature
        let claims = verify_signature(token, &jwk, &header.alg, algorithm)?;

        if claims.sub.is_empty() {
            tracing::debug!(target: "gateway.auth.jwt", "Token has empty subject");
            return Err(FailureReason::Malformed);
        }

        // 4. Issuer
        if claims.iss != expected.issuer {
            tracing::debug!(
                target: "gateway.auth.jwt",
                iss = %claims.iss,
                expected = %expected.issuer,
                "Token issuer mismatch"
            );
            return Err(FailureReason::IssuerMismatch);
        }

        // 5. Audience
        if !claims.aud.contains(&expected.audience) {
            tracing::debug!(target: "gateway.auth.jwt", "Token audience mismatch");
            return Err(FailureReason::AudienceMismatch);
        }

        // 6. Time claims
        validate_exp_at(claims.exp, now).map_err(|e| {
            tracing::debug!(
                target: "gateway.auth.jwt",
                error = ?e,
                exp = claims.exp,
                now,
                "Token exp validation failed"
            );
            FailureReason::Expired
        })?;

        if let Some(iat) = claims.iat {
            validate_iat_at(iat, self.clock_skew, now).map_err(|e| {
                tracing::debug!(
                    target: "gateway.auth.jwt",
                    error = ?e,
                    iat,
                    now,
                    "Token iat validation failed"
                );
                FailureReason::Expired
            })?;
        }

        if let Some(nbf) = claims.nbf {
            validate_nbf_at(nbf, self.clock_skew, now).map_err(|e| {
                tracing::debug!(
                    target: "gateway.auth.jwt",
                    error = ?e,
                    nbf,
                    now,
                    "Token nbf validation failed"
                );
                FailureReason::Expired
            })?;
        }

        Ok(claims)
    }
}

/// Map a header `alg` to a supported algorithm.
fn supported_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "EdDSA" => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Build the decoding key for `jwk`, checking it fits the token's algorithm.
fn decoding_key(
    jwk: &Jwk,
    alg_name: &str,
    algorithm: Algorithm,
) -> Result<DecodingKey, FailureReason> {
    if jwk.alg.as_deref().is_some_and(|key_alg| key_alg != alg_name) {
        tracing::debug!(
            target: "gateway.auth.jwt",
            key_alg = ?jwk.alg,
            token_alg = %alg_name,
            "Key algorithm does not match token algorithm"
        );
        return Err(FailureReason::InvalidSignature);
    }

    match algorithm {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            if jwk.kty != "RSA" {
                tracing::debug!(
                    target: "gateway.auth.jwt",
                    kty = %jwk.kty,
                    "RSA token with non-RSA key"
                );
                return Err(FailureReason::InvalidSignature);
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::warn!(
                    target: "gateway.auth.jwt",
                    kid = %jwk.kid,
                    "RSA key missing modulus or exponent"
                );
                return Err(FailureReason::Other);
            };
            DecodingKey::from_rsa_components(n, e).map_err(|e| {
                tracing::warn!(
                    target: "gateway.auth.jwt",
                    kid = %jwk.kid,
                    error = %e,
                    "Invalid RSA key material"
                );
                FailureReason::Other
            })
        }
        Algorithm::EdDSA => {
            if jwk.kty != "OKP" || jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                tracing::debug!(
                    target: "gateway.auth.jwt",
                    kty = %jwk.kty,
                    "EdDSA token with non-Ed25519 key"
                );
                return Err(FailureReason::InvalidSignature);
            }
            let Some(x) = jwk.x.as_deref() else {
                tracing::warn!(
                    target: "gateway.auth.jwt",
                    kid = %jwk.kid,
                    "OKP key missing public key"
                );
                return Err(FailureReason::Other);
            };
            DecodingKey::from_ed_components(x).map_err(|e| {
                tracing::warn!(
                    target: "gateway.auth.jwt",
                    kid = %jwk.kid,
                    error = %e,
                    "Invalid Ed25519 key material"
                );
                FailureReason::Other
            })
        }
        _ => Err(FailureReason::Malformed),
    }
}

/// Verify the token signature with a JWK and decode its claims.
///
/// Claim checks are left to the caller so they run against an explicit `now`
/// and in a fixed order.
fn verify_signature(
    token: &str,
    jwk: &Jwk,
    alg_name: &str,
    algorithm: Algorithm,
) -> Result<Claims, FailureReason> {
    let decoding_key = decoding_key(jwk, alg_name, algorithm)?;

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "gateway.auth.jwt", error = %e, "Token verification failed");
        match e.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::Crypto(_) => FailureReason::InvalidSignature,
            _ => FailureReason::Malformed,
        }
    })?;

    Ok(token_data.claims)
}

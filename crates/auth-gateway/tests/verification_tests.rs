//! Verifier and key resolver tests against an in-memory key set.
//!
//! All checks run at a fixed `now` so time boundaries are exact.

// Test code is allowed to use expect/unwrap for assertions
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use auth_gateway::auth::{
    Claims, ExpectedClaims, FailureReason, KeyResolver, KeySetFetchError, ResolveError,
    TokenVerifier, VerificationOutcome,
};
use futures::future::join_all;
use gateway_test_utils::{firebase_issuer, MockKeySetFetcher, TestSigningKey, TestTokenBuilder};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;

const PROJECT_ID: &str = "demo-project";
const NOW: i64 = 1_700_000_000;
const SKEW: Duration = Duration::from_secs(5);

fn expected() -> ExpectedClaims {
    ExpectedClaims {
        issuer: firebase_issuer(PROJECT_ID),
        audience: PROJECT_ID.to_string(),
    }
}

fn claims_at_now() -> TestTokenBuilder {
    TestTokenBuilder::for_project(PROJECT_ID)
        .issued_at(NOW)
        .expires_at(NOW + 3600)
}

struct Harness {
    key: TestSigningKey,
    fetcher: Arc<MockKeySetFetcher>,
    resolver: Arc<KeyResolver>,
    verifier: TokenVerifier,
}

impl Harness {
    fn with_fetcher(key: TestSigningKey, fetcher: MockKeySetFetcher) -> Self {
        let fetcher = Arc::new(fetcher);
        let resolver = Arc::new(KeyResolver::new(fetcher.clone()));
        let verifier = TokenVerifier::new(resolver.clone(), SKEW);
        Self {
            key,
            fetcher,
            resolver,
            verifier,
        }
    }

    fn new() -> Self {
        let key = TestSigningKey::ed25519(1, "key-01").unwrap();
        let fetcher = MockKeySetFetcher::with_keys(vec![key.jwk_json()]);
        Self::with_fetcher(key, fetcher)
    }

    async fn verify(&self, claims: &TestTokenBuilder) -> VerificationOutcome {
        let token = self.key.sign(&claims.clone().build()).unwrap();
        self.verifier.verify(&token, &expected(), NOW).await
    }
}

fn verified(outcome: VerificationOutcome) -> Claims {
    match outcome {
        VerificationOutcome::Verified(claims) => claims,
        VerificationOutcome::Rejected(reason) => panic!("expected verification, got {reason}"),
    }
}

fn rejected(outcome: VerificationOutcome) -> FailureReason {
    match outcome {
        VerificationOutcome::Rejected(reason) => reason,
        VerificationOutcome::Verified(_) => panic!("expected rejection"),
    }
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn test_verified_subject_is_preserved_exactly() {
    let harness = Harness::new();
    let subject = "user/ü-42 with spaces";

    let outcome = harness.verify(&claims_at_now().for_user(subject)).await;

    let claims = verified(outcome);
    assert_eq!(claims.sub, subject);
    assert_eq!(claims.iss, firebase_issuer(PROJECT_ID));
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let harness = Harness::new();
    let builder = claims_at_now().with_email("alice@example.com", true);

    let first = harness.verify(&builder).await;
    let second = harness.verify(&builder).await;

    assert!(matches!(first, VerificationOutcome::Verified(_)));
    assert_eq!(first, second);
    assert_eq!(harness.fetcher.fetch_count(), 1, "cached key set reused");
}

#[tokio::test]
async fn test_expiry_boundary_is_strict() {
    let harness = Harness::new();

    let one_second_left = harness.verify(&claims_at_now().expires_at(NOW + 1)).await;
    verified(one_second_left);

    let at_expiry = harness.verify(&claims_at_now().expires_at(NOW)).await;
    assert_eq!(rejected(at_expiry), FailureReason::Expired);

    let long_gone = harness
        .verify(&claims_at_now().issued_at(NOW - 7200).expires_at(NOW - 3600))
        .await;
    assert_eq!(rejected(long_gone), FailureReason::Expired);
}

#[tokio::test]
async fn test_issued_at_in_future_respects_skew() {
    let harness = Harness::new();

    let within_skew = harness.verify(&claims_at_now().issued_at(NOW + 5)).await;
    verified(within_skew);

    let beyond_skew = harness.verify(&claims_at_now().issued_at(NOW + 60)).await;
    assert_eq!(rejected(beyond_skew), FailureReason::Expired);
}

#[tokio::test]
async fn test_not_before_in_future_is_expired() {
    let harness = Harness::new();

    let outcome = harness.verify(&claims_at_now().not_before(NOW + 600)).await;

    assert_eq!(rejected(outcome), FailureReason::Expired);
}

#[tokio::test]
async fn test_issuer_checked_before_audience() {
    let harness = Harness::new();

    let outcome = harness
        .verify(
            &claims_at_now()
                .issued_by("https://securetoken.google.com/other-project")
                .for_audience("other-project"),
        )
        .await;

    assert_eq!(rejected(outcome), FailureReason::IssuerMismatch);
}

#[tokio::test]
async fn test_audience_mismatch_and_array_membership() {
    let harness = Harness::new();

    let wrong = harness.verify(&claims_at_now().for_audience("other-project")).await;
    assert_eq!(rejected(wrong), FailureReason::AudienceMismatch);

    let case_differs = harness.verify(&claims_at_now().for_audience("Demo-Project")).await;
    assert_eq!(rejected(case_differs), FailureReason::AudienceMismatch);

    let listed = harness
        .verify(&claims_at_now().for_audiences(&["other-project", PROJECT_ID]))
        .await;
    verified(listed);
}

#[tokio::test]
async fn test_empty_subject_is_malformed() {
    let harness = Harness::new();

    let outcome = harness.verify(&claims_at_now().for_user("")).await;

    assert_eq!(rejected(outcome), FailureReason::Malformed);
}

#[tokio::test]
async fn test_symmetric_algorithm_rejected_without_fetch() {
    let harness = Harness::new();
    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some("key-01".to_string());
    let token = encode(
        &header,
        &claims_at_now().build(),
        &EncodingKey::from_secret(b"shared-secret"),
    )
    .unwrap();

    let outcome = harness.verifier.verify(&token, &expected(), NOW).await;

    assert_eq!(rejected(outcome), FailureReason::Malformed);
    assert_eq!(harness.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_garbage_token_is_malformed() {
    let harness = Harness::new();

    for token in ["", "not-a-token", "a.b", "a..c", "a.b.c.d"] {
        let outcome = harness.verifier.verify(token, &expected(), NOW).await;
        assert_eq!(rejected(outcome), FailureReason::Malformed, "token {token:?}");
    }
    assert_eq!(harness.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_key_published_for_other_algorithm_is_invalid_signature() {
    let key = TestSigningKey::ed25519(1, "key-01").unwrap();
    let mut jwk = key.jwk_json();
    jwk["alg"] = serde_json::json!("RS256");
    let harness = Harness::with_fetcher(key, MockKeySetFetcher::with_keys(vec![jwk]));

    let outcome = harness.verify(&claims_at_now()).await;

    assert_eq!(rejected(outcome), FailureReason::InvalidSignature);
}

#[tokio::test]
async fn test_signature_from_other_key_is_invalid_signature() {
    let published = TestSigningKey::ed25519(1, "key-01").unwrap();
    let forger = TestSigningKey::ed25519(2, "key-01").unwrap();
    let harness =
        Harness::with_fetcher(forger, MockKeySetFetcher::with_keys(vec![published.jwk_json()]));

    let outcome = harness.verify(&claims_at_now()).await;

    assert_eq!(rejected(outcome), FailureReason::InvalidSignature);
}

#[tokio::test]
async fn test_unreachable_key_set_is_distinct_from_missing_key() {
    let key = TestSigningKey::ed25519(1, "key-01").unwrap();
    let harness = Harness::with_fetcher(
        key,
        MockKeySetFetcher::failing(KeySetFetchError::Transport("connection refused".to_string())),
    );

    let outcome = harness.verify(&claims_at_now()).await;

    assert_eq!(rejected(outcome), FailureReason::KeySetUnavailable);
}

// ============================================================================
// Key resolution
// ============================================================================

#[tokio::test]
async fn test_unknown_kid_refetches_exactly_once() {
    let harness = Harness::new();
    harness.resolver.prime().await.unwrap();
    assert_eq!(harness.fetcher.fetch_count(), 1);

    let result = harness.resolver.resolve("missing-kid").await;

    assert_eq!(result, Err(ResolveError::NotFound));
    assert_eq!(harness.fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_rotated_key_found_after_refetch() {
    let harness = Harness::new();
    harness.resolver.prime().await.unwrap();

    let rotated = TestSigningKey::ed25519(7, "key-02").unwrap();
    harness
        .fetcher
        .publish(vec![harness.key.jwk_json(), rotated.jwk_json()]);
    let token = rotated.sign(&claims_at_now().build()).unwrap();

    let outcome = harness.verifier.verify(&token, &expected(), NOW).await;

    verified(outcome);
    assert_eq!(harness.fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_concurrent_unknown_kids_share_one_refetch() {
    let key = TestSigningKey::ed25519(1, "key-01").unwrap();
    let fetcher = MockKeySetFetcher::with_keys(vec![key.jwk_json()])
        .with_delay(Duration::from_millis(50));
    let harness = Harness::with_fetcher(key, fetcher);
    harness.resolver.prime().await.unwrap();

    let stranger = TestSigningKey::ed25519(3, "unknown-kid").unwrap();
    let token = stranger.sign(&claims_at_now().build()).unwrap();
    let expected = expected();

    let outcomes = join_all((0..20).map(|_| harness.verifier.verify(&token, &expected, NOW))).await;

    for outcome in outcomes {
        assert_eq!(rejected(outcome), FailureReason::NoMatchingKey);
    }
    assert_eq!(
        harness.fetcher.fetch_count(),
        2,
        "initial load plus a single shared refetch"
    );
}

#[tokio::test]
async fn test_repeated_unknown_kid_is_suppressed_during_cooldown() {
    let harness = Harness::new();
    harness.resolver.prime().await.unwrap();

    for _ in 0..5 {
        assert_eq!(
            harness.resolver.resolve("missing-kid").await,
            Err(ResolveError::NotFound)
        );
    }

    assert_eq!(harness.fetcher.fetch_count(), 2);
}

#[tokio::test]
async fn test_failed_fetch_is_retried_on_next_request() {
    let harness = Harness::new();
    harness.fetcher.fail_with(KeySetFetchError::Status(502));

    let first = harness.resolver.resolve("key-01").await;
    assert!(matches!(first, Err(ResolveError::Unavailable(_))));

    harness.fetcher.publish(vec![harness.key.jwk_json()]);
    let second = harness.resolver.resolve("key-01").await;

    assert!(second.is_ok());
    assert_eq!(harness.fetcher.fetch_count(), 2);
    assert!(harness.resolver.is_loaded().await);
}

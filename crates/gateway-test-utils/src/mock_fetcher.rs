//! In-memory key-set fetcher for resolver and verifier tests.

use async_trait::async_trait;
use auth_gateway::auth::{Jwk, JwksResponse, KeySetFetchError, KeySetFetcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Key-set fetcher that serves a configurable response and counts calls.
///
/// # Example
/// ```rust,ignore
/// let fetcher = Arc::new(MockKeySetFetcher::with_keys(vec![key.jwk_json()]));
/// let resolver = KeyResolver::new(fetcher.clone());
/// // ...
/// assert_eq!(fetcher.fetch_count(), 1);
/// ```
pub struct MockKeySetFetcher {
    response: Mutex<Result<Vec<Jwk>, KeySetFetchError>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockKeySetFetcher {
    /// Fetcher publishing `keys` (JWK JSON as produced by `TestSigningKey::jwk_json`).
    pub fn with_keys(keys: Vec<serde_json::Value>) -> Self {
        Self {
            response: Mutex::new(Ok(parse_keys(keys))),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Fetcher whose every call fails with `error`.
    pub fn failing(error: KeySetFetchError) -> Self {
        Self {
            response: Mutex::new(Err(error)),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Delay each fetch, so concurrent callers pile up behind one in-flight call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the published keys.
    pub fn publish(&self, keys: Vec<serde_json::Value>) {
        *self.response.lock().unwrap() = Ok(parse_keys(keys));
    }

    /// Make subsequent fetches fail.
    pub fn fail_with(&self, error: KeySetFetchError) {
        *self.response.lock().unwrap() = Err(error);
    }

    /// Number of fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for MockKeySetFetcher {
    async fn fetch(&self) -> Result<JwksResponse, KeySetFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.response.lock().unwrap().clone();
        response.map(|keys| JwksResponse { keys })
    }
}

fn parse_keys(keys: Vec<serde_json::Value>) -> Vec<Jwk> {
    keys.into_iter()
        .map(|key| serde_json::from_value(key).expect("test JWK should deserialize"))
        .collect()
}

//! Key resolver for the identity provider's published signing keys.
//!
//! Fetches the JWKS (JSON Web Key Set) from the configured endpoint and
//! caches it in memory. The cached set is replaced wholesale on refresh,
//! never mutated.
//!
//! # Refresh policy
//!
//! - First use (or [`KeyResolver::prime`]) loads the set
//! - A set older than the cache TTL is refreshed on next use
//! - An unknown `kid` triggers exactly one refetch before `NotFound`
//! - Concurrent refreshes are single-flight: callers that queued behind an
//!   in-flight fetch take its result (keys or error) instead of fetching again
//! - After a refetch that still lacks the requested `kid`, further
//!   unknown-`kid` refetches are suppressed for the cooldown window
//!
//! # Security
//!
//! - HTTPS should be used in production (rustls verifies the endpoint certificate)
//! - Fetches are bounded by a timeout so a stalled provider cannot block verification

use crate::observability::metrics::{record_jwks_fetch, record_jwks_refetch_suppressed};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (10 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;

/// Default timeout for one key-set fetch in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default cooldown between unknown-`kid` refetches in seconds.
pub const DEFAULT_REFETCH_COOLDOWN_SECONDS: u64 = 30;

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: String,

    /// Algorithm the key is meant for (e.g. "RS256", "EdDSA").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// OKP curve name ("Ed25519").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// OKP public key (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
}

/// JWKS document as published by the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Result of looking a `kid` up in a [`SigningKeySet`].
#[derive(Debug, PartialEq, Eq)]
pub enum KeyLookup<'a> {
    Found(&'a Jwk),
    Missing,
    /// More than one distinct key claims this `kid`.
    Ambiguous(usize),
}

/// Immutable set of signing keys indexed by key ID.
///
/// Byte-identical duplicates are collapsed; distinct keys sharing a `kid`
/// are kept so that lookups can report the conflict instead of guessing.
#[derive(Debug, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, Vec<Jwk>>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document.
    ///
    /// Keys without a `kid`, or whose `use` is present and not `sig`, are skipped.
    pub fn from_jwks(jwks: JwksResponse) -> Self {
        let mut keys: HashMap<String, Vec<Jwk>> = HashMap::new();

        for jwk in jwks.keys {
            if jwk.kid.is_empty() {
                tracing::debug!(
                    target: "gateway.auth.jwks",
                    kty = %jwk.kty,
                    "Skipping JWK without kid"
                );
                continue;
            }
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                tracing::debug!(
                    target: "gateway.auth.jwks",
                    kid = %jwk.kid,
                    "Skipping non-signing JWK"
                );
                continue;
            }

            let candidates = keys.entry(jwk.kid.clone()).or_default();
            if !candidates.contains(&jwk) {
                candidates.push(jwk);
            }
        }

        for (kid, candidates) in &keys {
            if candidates.len() > 1 {
                tracing::warn!(
                    target: "gateway.auth.jwks",
                    kid = %kid,
                    candidates = candidates.len(),
                    "Published key set has conflicting keys for one kid"
                );
            }
        }

        Self { keys }
    }

    pub fn lookup(&self, kid: &str) -> KeyLookup<'_> {
        match self.keys.get(kid).map(Vec::as_slice) {
            None | Some([]) => KeyLookup::Missing,
            Some([jwk]) => KeyLookup::Found(jwk),
            Some(candidates) => KeyLookup::Ambiguous(candidates.len()),
        }
    }

    /// Number of distinct key IDs.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Errors fetching the key set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeySetFetchError {
    #[error("HTTP client could not be built: {0}")]
    Client(String),

    #[error("Key set request failed: {0}")]
    Transport(String),

    #[error("Key set endpoint returned status {0}")]
    Status(u16),

    #[error("Key set response could not be parsed: {0}")]
    Decode(String),
}

/// Errors resolving a key ID.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No published key matches the key id")]
    NotFound,

    #[error("{candidates} published keys match the key id")]
    Ambiguous { candidates: usize },

    #[error("Key set unavailable: {0}")]
    Unavailable(KeySetFetchError),
}

/// Source of the published key set.
///
/// The production implementation is [`HttpKeySetFetcher`]; tests inject fakes.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwksResponse, KeySetFetchError>;
}

/// Fetches the key set over HTTPS.
pub struct HttpKeySetFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `KeySetFetchError::Client` if the HTTP client cannot be built.
    pub fn new(jwks_url: String, timeout: Duration) -> Result<Self, KeySetFetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySetFetchError::Client(e.to_string()))?;

        Ok(Self {
            jwks_url,
            http_client,
        })
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<JwksResponse, KeySetFetchError> {
        tracing::debug!(target: "gateway.auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to fetch JWKS");
                KeySetFetchError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gateway.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeySetFetchError::Status(response.status().as_u16()));
        }

        response.json::<JwksResponse>().await.map_err(|e| {
            tracing::error!(
                target: "gateway.auth.jwks",
                error = %e,
                "Failed to parse JWKS response"
            );
            KeySetFetchError::Decode(e.to_string())
        })
    }
}

/// Why a refresh was started (metric label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    Initial,
    Expired,
    UnknownKey,
}

impl RefreshTrigger {
    fn as_str(self) -> &'static str {
        match self {
            RefreshTrigger::Initial => "initial",
            RefreshTrigger::Expired => "expired",
            RefreshTrigger::UnknownKey => "unknown_kid",
        }
    }
}

/// Cached key set with freshness data.
struct CachedKeySet {
    keys: Arc<SigningKeySet>,

    /// When this set was fetched.
    fetched_at: Instant,

    /// Unknown-kid refetches are suppressed until this instant.
    miss_cooldown_until: Option<Instant>,
}

/// Resolves key IDs against the cached key set, refreshing it on demand.
///
/// Reads share a `RwLock`; refreshes are serialised by a separate mutex so at
/// most one fetch is in flight. The mutex also holds the error of the last
/// failed attempt, which callers that waited on that attempt receive.
pub struct KeyResolver {
    fetcher: Arc<dyn KeySetFetcher>,

    /// Cached key set.
    cache: RwLock<Option<CachedKeySet>>,

    /// Single-flight guard; holds the last failed attempt's error.
    refresh_lock: Mutex<Option<KeySetFetchError>>,

    /// Completed fetch attempts (success or failure).
    fetch_attempts: AtomicU64,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Minimum spacing of unknown-kid refetches that found nothing.
    refetch_cooldown: Duration,
}

impl KeyResolver {
    /// Create a resolver with default TTL and cooldown.
    pub fn new(fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self::with_settings(
            fetcher,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            Duration::from_secs(DEFAULT_REFETCH_COOLDOWN_SECONDS),
        )
    }

    /// Create a resolver with custom cache TTL and refetch cooldown.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of the key set
    /// * `cache_ttl` - How long a fetched set is used before refreshing
    /// * `refetch_cooldown` - Suppression window after a fruitless unknown-kid refetch
    pub fn with_settings(
        fetcher: Arc<dyn KeySetFetcher>,
        cache_ttl: Duration,
        refetch_cooldown: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(None),
            fetch_attempts: AtomicU64::new(0),
            cache_ttl,
            refetch_cooldown,
        }
    }

    /// Resolve a key ID to its JWK.
    ///
    /// # Errors
    ///
    /// - `ResolveError::NotFound` if the key is absent after one refetch
    /// - `ResolveError::Ambiguous` if the published set has conflicting keys for `kid`
    /// - `ResolveError::Unavailable` if the key set could not be fetched
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Jwk, ResolveError> {
        let attempts_seen = self.fetch_attempts.load(Ordering::Acquire);

        let trigger = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                None => RefreshTrigger::Initial,
                Some(cached) if cached.fetched_at.elapsed() >= self.cache_ttl => {
                    RefreshTrigger::Expired
                }
                Some(cached) => match lookup_owned(&cached.keys, kid) {
                    Err(ResolveError::NotFound) => {
                        tracing::debug!(
                            target: "gateway.auth.jwks",
                            kid = %kid,
                            "Key not found in JWKS cache"
                        );
                        RefreshTrigger::UnknownKey
                    }
                    other => {
                        tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "JWKS cache hit");
                        return other;
                    }
                },
            }
        };

        let keys = self.refresh(trigger, attempts_seen, Some(kid)).await?;

        let result = lookup_owned(&keys, kid);
        if matches!(result, Err(ResolveError::NotFound)) {
            tracing::warn!(
                target: "gateway.auth.jwks",
                kid = %kid,
                "Key not found in JWKS after refresh"
            );
        }
        result
    }

    /// Load the key set eagerly, returning the number of key IDs.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Unavailable` if the fetch fails.
    pub async fn prime(&self) -> Result<usize, ResolveError> {
        let attempts_seen = self.fetch_attempts.load(Ordering::Acquire);
        let keys = self
            .refresh(RefreshTrigger::Initial, attempts_seen, None)
            .await?;
        Ok(keys.len())
    }

    /// Whether a key set has been loaded.
    pub async fn is_loaded(&self) -> bool {
        self.cache.read().await.is_some()
    }

    /// Refresh the cache, sharing the result of any fetch that completed
    /// while this caller waited for the refresh lock.
    async fn refresh(
        &self,
        trigger: RefreshTrigger,
        attempts_seen: u64,
        kid: Option<&str>,
    ) -> Result<Arc<SigningKeySet>, ResolveError> {
        let mut last_error = self.refresh_lock.lock().await;

        if self.fetch_attempts.load(Ordering::Acquire) != attempts_seen {
            if let Some(err) = last_error.as_ref() {
                tracing::debug!(
                    target: "gateway.auth.jwks",
                    "Sharing failed result of concurrent JWKS fetch"
                );
                return Err(ResolveError::Unavailable(err.clone()));
            }
            if let Some(keys) = self.current_keys().await {
                tracing::debug!(target: "gateway.auth.jwks", "JWKS refreshed by concurrent caller");
                return Ok(keys);
            }
        }

        if trigger == RefreshTrigger::UnknownKey {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached
                    .miss_cooldown_until
                    .is_some_and(|until| Instant::now() < until)
                {
                    record_jwks_refetch_suppressed();
                    tracing::debug!(
                        target: "gateway.auth.jwks",
                        "Unknown-kid refetch suppressed by cooldown"
                    );
                    return Ok(Arc::clone(&cached.keys));
                }
            }
        }

        let start = Instant::now();
        let result = self.fetcher.fetch().await;
        let status = if result.is_ok() { "success" } else { "error" };
        record_jwks_fetch(trigger.as_str(), status, start.elapsed());

        let jwks = match result {
            Ok(jwks) => jwks,
            Err(err) => {
                tracing::error!(
                    target: "gateway.auth.jwks",
                    error = %err,
                    trigger = trigger.as_str(),
                    "JWKS refresh failed"
                );
                *last_error = Some(err.clone());
                self.fetch_attempts.fetch_add(1, Ordering::Release);
                return Err(ResolveError::Unavailable(err));
            }
        };

        let keys = Arc::new(SigningKeySet::from_jwks(jwks));
        let now = Instant::now();
        let miss_cooldown_until = kid
            .filter(|kid| keys.lookup(kid) == KeyLookup::Missing)
            .and_then(|_| now.checked_add(self.refetch_cooldown));

        tracing::info!(
            target: "gateway.auth.jwks",
            key_count = keys.len(),
            trigger = trigger.as_str(),
            "JWKS cache refreshed"
        );

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedKeySet {
                keys: Arc::clone(&keys),
                fetched_at: now,
                miss_cooldown_until,
            });
        }
        *last_error = None;
        self.fetch_attempts.fetch_add(1, Ordering::Release);

        Ok(keys)
    }

    async fn current_keys(&self) -> Option<Arc<SigningKeySet>> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|cached| Arc::clone(&cached.keys))
    }
}

fn lookup_owned(keys: &SigningKeySet, kid: &str) -> Result<Jwk, ResolveError> {
    match keys.lookup(kid) {
        KeyLookup::Found(jwk) => Ok(jwk.clone()),
        KeyLookup::Missing => Err(ResolveError::NotFound),
        KeyLookup::Ambiguous(candidates) => Err(ResolveError::Ambiguous { candidates }),
    }
}

//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. The expected issuer
//! and audience both derive from the project identifier unless overridden.

use crate::auth::jwks::{
    DEFAULT_CACHE_TTL_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS, DEFAULT_REFETCH_COOLDOWN_SECONDS,
};
use crate::auth::ExpectedClaims;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Google's published keys for Firebase ID tokens.
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Issuer template; `{project_id}` is replaced by the project identifier.
pub const DEFAULT_ISSUER_TEMPLATE: &str = "https://securetoken.google.com/{project_id}";

const PROJECT_ID_PLACEHOLDER: &str = "{project_id}";

/// Upper bound for the key-set TTL, fetch timeout and refetch cooldown (one day).
pub const MAX_DURATION_SECONDS: u64 = 86_400;

/// Gateway configuration.
///
/// Nothing here is secret, so Debug is derived.
#[derive(Debug, Clone)]
pub struct Config {
    /// Trust-domain identifier (Firebase project id).
    pub project_id: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the published signing key set.
    pub jwks_url: String,

    /// Issuer every accepted token must carry.
    pub expected_issuer: String,

    /// Audience every accepted token must carry.
    pub expected_audience: String,

    /// Tolerance for `iat`/`nbf` ahead of the local clock.
    pub clock_skew: Duration,

    /// How long a fetched key set is used before refreshing.
    pub jwks_cache_ttl: Duration,

    /// Upper bound on one key-set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Suppression window after an unknown-kid refetch that found nothing.
    pub jwks_refetch_cooldown: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let project_id = vars
            .get("FIREBASE_PROJECT_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("FIREBASE_PROJECT_ID".to_string()))?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = non_empty(vars, "JWKS_URL")?.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());
        if !jwks_url.starts_with("https://") {
            tracing::warn!(
                target: "gateway.config",
                jwks_url = %jwks_url,
                "JWKS_URL is not HTTPS; only acceptable for local testing"
            );
        }

        let issuer_template = non_empty(vars, "ISSUER_TEMPLATE")?
            .unwrap_or_else(|| DEFAULT_ISSUER_TEMPLATE.to_string());
        let expected_issuer = issuer_template.replace(PROJECT_ID_PLACEHOLDER, &project_id);

        let expected_audience =
            non_empty(vars, "EXPECTED_AUDIENCE")?.unwrap_or_else(|| project_id.clone());

        // Parse JWT clock skew tolerance with validation
        let clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_cache_ttl = parse_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_CACHE_TTL_SECONDS,
            true,
        )?;
        let jwks_fetch_timeout = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
            true,
        )?;
        let jwks_refetch_cooldown = parse_seconds(
            vars,
            "JWKS_REFETCH_COOLDOWN_SECONDS",
            DEFAULT_REFETCH_COOLDOWN_SECONDS,
            false,
        )?;

        Ok(Config {
            project_id,
            bind_address,
            jwks_url,
            expected_issuer,
            expected_audience,
            clock_skew,
            jwks_cache_ttl,
            jwks_fetch_timeout,
            jwks_refetch_cooldown,
        })
    }

    /// Issuer and audience for the token verifier.
    pub fn expected_claims(&self) -> ExpectedClaims {
        ExpectedClaims {
            issuer: self.expected_issuer.clone(),
            audience: self.expected_audience.clone(),
        }
    }
}

/// Optional variable that must not be blank when set.
fn non_empty(vars: &HashMap<String, String>, name: &str) -> Result<Option<String>, ConfigError> {
    match vars.get(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        }),
        Some(value) => Ok(Some(value.trim().to_string())),
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    require_positive: bool,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a non-negative integer, got '{}': {}", value_str, e),
    })?;

    if require_positive && value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    if value > MAX_DURATION_SECONDS {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must not exceed {MAX_DURATION_SECONDS} seconds, got {value}"),
        });
    }

    Ok(Duration::from_secs(value))
}

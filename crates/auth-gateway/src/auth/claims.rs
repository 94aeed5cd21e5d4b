//! Identity claims carried by a verified token.
//!
//! The `sub` and `email` fields are redacted in Debug output to prevent
//! exposure in logs.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Audience claim, which may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Exact, case-sensitive membership check.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims of a token that passed full verification.
///
/// Only the verifier hands these out, and only after signature, issuer,
/// audience and time checks all succeed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Issuer URI.
    pub iss: String,

    /// Audience.
    pub aud: Audience,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Email address - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the identity provider has verified the email address.
    #[serde(
        default,
        deserialize_with = "deserialize_bool_like",
        skip_serializing_if = "Option::is_none"
    )]
    pub email_verified: Option<bool>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

impl Claims {
    /// Email for the `X-User-Email` header; empty when absent.
    pub fn email_or_empty(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }

    /// Verification flag for the `X-User-Verified` header; false when absent.
    pub fn is_email_verified(&self) -> bool {
        self.email_verified.unwrap_or(false)
    }
}

/// Accepts a JSON bool or the strings "true"/"false".
///
/// Any other value reads as `false` so an odd flag never rejects an
/// otherwise valid token.
fn deserialize_bool_like<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<BoolLike>::deserialize(deserializer)? {
        None => None,
        Some(BoolLike::Bool(value)) => Some(value),
        Some(BoolLike::Text(text)) => Some(text == "true"),
        Some(BoolLike::Other(_)) => Some(false),
    })
}

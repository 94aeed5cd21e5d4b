//! Builder patterns for test data construction
//!
//! Provides a fluent API for ID-token claims in the shape Firebase issues.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer for `project_id` under the default issuer template.
pub fn firebase_issuer(project_id: &str) -> String {
    format!("https://securetoken.google.com/{project_id}")
}

/// Builder for creating test ID-token claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::for_project("demo-project")
///     .for_user("alice")
///     .with_email("alice@example.com", true)
///     .expires_in(3600)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    sub: String,
    iss: String,
    aud: Value,
    exp: i64,
    iat: Option<i64>,
    nbf: Option<i64>,
    email: Option<String>,
    email_verified: Option<Value>,
}

impl TestTokenBuilder {
    /// Claims that verify against the default config for `project_id`.
    pub fn for_project(project_id: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: "test-user".to_string(),
            iss: firebase_issuer(project_id),
            aud: json!(project_id),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: Some(now.timestamp()),
            nbf: None,
            email: None,
            email_verified: None,
        }
    }

    /// Set the subject (user id)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = json!(audience);
        self
    }

    /// Audience as an array
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set expiration to an absolute timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    pub fn without_issued_at(mut self) -> Self {
        self.iat = None;
        self
    }

    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    pub fn with_email(mut self, email: &str, verified: bool) -> Self {
        self.email = Some(email.to_string());
        self.email_verified = Some(json!(verified));
        self
    }

    /// Set `email_verified` to an arbitrary JSON value (e.g. the string "true")
    pub fn with_email_verified_value(mut self, value: Value) -> Self {
        self.email_verified = Some(value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("exp".to_string(), json!(self.exp));
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(verified) = self.email_verified {
            claims.insert("email_verified".to_string(), verified);
        }
        Value::Object(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::for_project("demo-project")
            .for_user("alice")
            .with_email("alice@example.com", true)
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["iss"], "https://securetoken.google.com/demo-project");
        assert_eq!(claims["aud"], "demo-project");
        assert_eq!(claims["email_verified"], true);
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_builder_omits_unset_optionals() {
        let claims = TestTokenBuilder::for_project("demo-project")
            .without_issued_at()
            .build();

        assert!(claims.get("iat").is_none());
        assert!(claims.get("nbf").is_none());
        assert!(claims.get("email").is_none());
    }
}

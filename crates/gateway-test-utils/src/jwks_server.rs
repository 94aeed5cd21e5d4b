//! Mock JWKS endpoint backed by wiremock.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock identity-provider key endpoint.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::start(vec![key.jwk_json()]).await;
/// // ... exercise the gateway
/// assert_eq!(jwks.fetch_count().await, 1);
/// ```
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server publishing `keys`.
    pub async fn start(keys: Vec<serde_json::Value>) -> Self {
        let jwks = Self {
            server: MockServer::start().await,
        };
        jwks.publish(keys).await;
        jwks
    }

    /// Full URL of the key set.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Replace the published keys (simulates key rotation).
    ///
    /// Also resets the recorded request count.
    pub async fn publish(&self, keys: Vec<serde_json::Value>) {
        let body = serde_json::json!({ "keys": keys });
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Make the endpoint answer every request with `status`.
    pub async fn fail_with_status(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of key-set requests received since start or last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}

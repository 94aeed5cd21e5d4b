//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use auth_gateway::auth::{HttpKeySetFetcher, KeyResolver};
use auth_gateway::config::Config;
use auth_gateway::observability::metrics::init_metrics_recorder;
use auth_gateway::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let jwks = MockJwksServer::start(vec![]).await;
///     let server = TestGatewayServer::spawn(&jwks.jwks_url(), "demo-project").await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway for `project_id` that fetches keys from `jwks_url`.
    ///
    /// The refetch cooldown is disabled so tests see every refetch.
    pub async fn spawn(jwks_url: &str, project_id: &str) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("FIREBASE_PROJECT_ID".to_string(), project_id.to_string()),
            ("JWKS_URL".to_string(), jwks_url.to_string()),
            ("JWKS_REFETCH_COOLDOWN_SECONDS".to_string(), "0".to_string()),
        ]);
        Self::spawn_with_vars(vars).await
    }

    /// Spawn a gateway from explicit configuration variables.
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let fetcher = HttpKeySetFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout)
            .map_err(|e| anyhow::anyhow!("Failed to create JWKS fetcher: {}", e))?;
        let resolver = Arc::new(KeyResolver::with_settings(
            Arc::new(fetcher),
            config.jwks_cache_ttl,
            config.jwks_refetch_cooldown,
        ));

        let state = Arc::new(AppState::new(&config, resolver));
        let app = routes::build_routes(Arc::clone(&state), test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared application state (resolver, verifier, expected claims).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends
        self._handle.abort();
    }
}

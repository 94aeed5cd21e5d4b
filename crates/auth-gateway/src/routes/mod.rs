//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{ExpectedClaims, KeyResolver, TokenVerifier};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, request_timeout_middleware, REQUEST_TIMEOUT};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Resolver for the provider's signing keys (shared with the verifier).
    pub resolver: Arc<KeyResolver>,

    /// Token verifier.
    pub verifier: Arc<TokenVerifier>,

    /// Issuer and audience every token must carry.
    pub expected: ExpectedClaims,
}

impl AppState {
    /// Wire the verifier to `resolver` using the configured skew and claims.
    pub fn new(config: &Config, resolver: Arc<KeyResolver>) -> Self {
        let verifier = Arc::new(TokenVerifier::new(Arc::clone(&resolver), config.clock_skew));

        Self {
            resolver,
            verifier,
            expected: config.expected_claims(),
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness check (simple "OK")
/// - `/ready` - Readiness check (signing keys loaded)
/// - `/metrics` - Prometheus metrics endpoint
/// - every other path - token verification
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
///
/// The operational paths answer GET only; any other method on them falls
/// through to the verification handler, which verifies POST and rejects
/// the rest with the structured 405.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let gateway_routes = Router::new()
        .route(
            "/health",
            get(handlers::health_check).fallback(handlers::verify_request),
        )
        .route(
            "/ready",
            get(handlers::readiness_check).fallback(handlers::verify_request),
        )
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .with_state(metrics_handle)
                .fallback(handlers::verify_request),
        )
        .fallback(handlers::verify_request)
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - Log request details (innermost)
    // 2. request_timeout_middleware - Structured 408 after REQUEST_TIMEOUT
    // 3. http_metrics_middleware - Record ALL responses, timeouts included (outermost)
    gateway_routes
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            REQUEST_TIMEOUT,
            request_timeout_middleware,
        ))
        .layer(middleware::from_fn(http_metrics_middleware))
}

//! Health check handlers.
//!
//! - `/health`: Liveness check - returns OK if the process is running
//! - `/ready`: Readiness check - ready once a signing key set is loaded

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Signing key set status ("loaded" or "unavailable").
    pub signing_keys: &'static str,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness check handler.
///
/// Does NOT check any dependencies; failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check handler.
///
/// Returns 200 once the key set has been loaded. If it has not, one load is
/// attempted before answering 503, so a gateway that started while the
/// identity provider was unreachable recovers without a request having to
/// pay for it.
#[tracing::instrument(skip_all, name = "gateway.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.resolver.is_loaded().await {
        if let Err(e) = state.resolver.prime().await {
            tracing::warn!(
                target: "gateway.health",
                error = %e,
                "Readiness check failed: signing keys unavailable"
            );
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    signing_keys: "unavailable",
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            );
        }
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            signing_keys: "loaded",
            error: None,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[test]
    fn test_readiness_response_serialization() {
        let ready = ReadinessResponse {
            status: "ready",
            signing_keys: "loaded",
            error: None,
        };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert!(json.get("error").is_none());

        let not_ready = ReadinessResponse {
            status: "not_ready",
            signing_keys: "unavailable",
            error: Some("Service dependencies unavailable".to_string()),
        };
        let json = serde_json::to_value(&not_ready).unwrap();
        assert_eq!(json["signing_keys"], "unavailable");
        assert_eq!(json["error"], "Service dependencies unavailable");
    }
}

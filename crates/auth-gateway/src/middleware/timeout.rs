//! Request timeout middleware.
//!
//! A request that outlives the limit is answered with the structured 408
//! error body, so clients see the same `{error, message, timestamp}`
//! contract as for every other failure.

use crate::errors::GatewayError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// Default limit on handling one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Middleware bounding each request by the `Duration` held in state.
///
/// Install with
/// `axum::middleware::from_fn_with_state(REQUEST_TIMEOUT, request_timeout_middleware)`.
pub async fn request_timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                target: "gateway.middleware.timeout",
                timeout_ms = limit.as_millis() as u64,
                "Request timed out"
            );
            GatewayError::Timeout.into_response()
        }
    }
}

//! HTTP middleware for the gateway.

pub mod http_metrics;
pub mod timeout;

pub use http_metrics::http_metrics_middleware;
pub use timeout::{request_timeout_middleware, REQUEST_TIMEOUT};

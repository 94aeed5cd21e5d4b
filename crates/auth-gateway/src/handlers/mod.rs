//! HTTP request handlers for the gateway.

pub mod health;
pub mod metrics;
pub mod verify;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use verify::verify_request;

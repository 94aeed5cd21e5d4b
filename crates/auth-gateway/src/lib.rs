//! Auth Gateway Library
//!
//! An HTTP gateway that verifies identity-provider ID tokens (Firebase /
//! Google securetoken) and forwards the caller's identity to downstream
//! services as `X-User-*` response headers.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/verify.rs -> auth::TokenVerifier -> auth::KeyResolver
//!                                     -> classifier (FailureReason -> error code)
//! ```
//!
//! # Modules
//!
//! - `auth` - Key resolution, token verification, claims and outcomes
//! - `classifier` - Fixed mapping from failure reason to error code and status
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP response mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;

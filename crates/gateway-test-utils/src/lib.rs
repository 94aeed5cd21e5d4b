//! # Gateway Test Utilities
//!
//! Shared test utilities for the auth gateway.
//!
//! This crate provides:
//! - Deterministic signing keys (Ed25519 from a seed, a fixed RSA key)
//! - A fluent builder for ID-token claims
//! - A mock JWKS endpoint (wiremock) that counts fetches
//! - A mock key-set fetcher for resolver tests without HTTP
//! - A server harness that spawns the real router on a random port
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestSigningKey::ed25519(1, "key-1")?;
//!     let jwks = MockJwksServer::start(vec![key.jwk_json()]).await;
//!     let server = TestGatewayServer::spawn(&jwks.jwks_url(), "demo-project").await?;
//!
//!     let token = key.sign(&TestTokenBuilder::for_project("demo-project").build())?;
//!     // ... send a request with `Authorization: Bearer {token}`
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod mock_fetcher;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use mock_fetcher::*;
pub use server_harness::*;
pub use token_builders::*;

//! Token authentication: key resolution and token verification.

pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod outcome;

pub use claims::{Audience, Claims};
pub use jwks::{
    HttpKeySetFetcher, Jwk, JwksResponse, KeyResolver, KeySetFetchError, KeySetFetcher,
    ResolveError,
};
pub use jwt::{ExpectedClaims, TokenVerifier};
pub use outcome::{FailureReason, VerificationOutcome};

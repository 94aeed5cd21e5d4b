//! Common utilities shared across the auth gateway crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, header decoding, time-claim checks)
pub mod jwt;

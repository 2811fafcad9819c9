//! # hermes-auth
//!
//! [`TokenVerifier`](hermes_core::TokenVerifier) implementations.
//!
//! - [`JwtVerifier`]: HS256 JWTs, identity read from a configurable claim
//! - [`StaticVerifier`]: fixed token table for development and tests

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;
pub mod static_tokens;

pub use errors::AuthError;
pub use jwt::JwtVerifier;
pub use static_tokens::StaticVerifier;

//! Auth error types.

use thiserror::Error;

/// Errors raised while building a verifier or issuing a token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The signing secret was empty.
    #[error("jwt secret must not be empty")]
    EmptySecret,
    /// The identity claim name was empty.
    #[error("identity claim must not be empty")]
    EmptyClaim,
    /// Signing failed.
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

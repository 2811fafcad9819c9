//! HS256 JWT verification.
//!
//! A token is accepted when it is a JSON string, its signature checks out
//! against the shared secret, it has not expired (within the configured
//! leeway), and the identity claim is a non-empty string. Anything else is
//! a rejection; the reason is logged at debug and never surfaced to the
//! client.

use std::fmt;

use chrono::Utc;
use hermes_core::{Identity, TokenVerifier};
use hermes_settings::AuthSettings;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::AuthError;

/// Verifies HS256 JWTs and extracts the identity claim.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    identity_claim: String,
}

impl JwtVerifier {
    /// Build a verifier for `secret`, reading the identity from `identity_claim`.
    pub fn new(secret: &str, identity_claim: &str, leeway_secs: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        if identity_claim.is_empty() {
            return Err(AuthError::EmptyClaim);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        Ok(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
            identity_claim: identity_claim.to_owned(),
        })
    }

    /// Build a verifier from the `auth` settings section.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        Self::new(
            &settings.jwt_secret,
            &settings.identity_claim,
            settings.leeway_secs,
        )
    }

    /// Sign a token naming `identity` that expires `ttl_secs` from now.
    pub fn issue(&self, identity: &Identity, ttl_secs: i64) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        let _ = claims.insert(
            self.identity_claim.clone(),
            Value::String(identity.to_string()),
        );
        let _ = claims.insert("iat".into(), Value::from(now));
        let _ = claims.insert("exp".into(), Value::from(now + ttl_secs));
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &Value) -> Option<Identity> {
        let Some(raw) = token.as_str() else {
            debug!("token rejected: not a string");
            return None;
        };
        let claims = match decode::<Map<String, Value>>(raw, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(reason = ?err.kind(), "token rejected");
                return None;
            }
        };
        match claims.get(&self.identity_claim) {
            Some(Value::String(identity)) if !identity.is_empty() => {
                Some(Identity::from(identity.as_str()))
            }
            _ => {
                debug!(claim = %self.identity_claim, "token rejected: identity claim missing");
                None
            }
        }
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("identity_claim", &self.identity_claim)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

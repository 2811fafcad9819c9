//! Fixed token table.

use std::collections::HashMap;

use hermes_core::{Identity, TokenVerifier};
use serde_json::Value;

/// Accepts only the string tokens it was built with.
#[derive(Clone, Debug, Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticVerifier {
    /// Empty table; every token is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: impl Into<Identity>) -> Self {
        let _ = self.tokens.insert(token.into(), identity.into());
        self
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &Value) -> Option<Identity> {
        token.as_str().and_then(|t| self.tokens.get(t)).cloned()
    }
}

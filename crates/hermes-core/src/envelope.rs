//! The `[kind, payload]` envelope and its codec.
//!
//! Every message in both directions is a two-element JSON array whose first
//! element is a string tag. Decoding rejects anything else before routing;
//! encoding is deterministic and passes the payload through untouched.

use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::Value;

use crate::errors::{DecodeError, json_type_name};

/// Message kinds used on the wire.
pub mod kinds {
    /// Client asks to authenticate; payload is the token.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Inbound frame was not a valid envelope; payload is the raw text.
    pub const UNABLE_TO_PARSE_JSON_ERROR: &str = "unable-to-parse-json-error";
    /// Non-auth message before authentication; payload is the original pair.
    pub const UNAUTHENTICATED_MESSAGE_RECEIVED: &str = "unauthenticated-message-received";
    /// Authentication succeeded; payload is the identity.
    pub const USER_AUTHENTICATED: &str = "user-authenticated";
    /// Verifier rejected the token; payload is `{token}`.
    pub const AUTHENTICATION_FAILED: &str = "authentication-failed";
    /// `authenticate` on an authenticated session; payload is the identity.
    pub const ALREADY_AUTHENTICATED: &str = "already-authenticated";
    /// Bus refused the identity's subscription; payload is `{identity}`.
    pub const SUBSCRIPTION_FAILED: &str = "subscription-failed";
    /// Event persisted; payload is `null`.
    pub const EVENT_SAVED: &str = "event-saved";
    /// Event could not be persisted; payload is `{name, error}`.
    pub const EVENT_SAVE_FAILED: &str = "event-save-failed";
}

/// A decoded `[kind, payload]` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// String tag used for routing.
    pub kind: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse a raw inbound frame.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        let items = match value {
            Value::Array(items) => items,
            other => return Err(DecodeError::NotAnArray(json_type_name(&other))),
        };
        let [kind, payload]: [Value; 2] = items
            .try_into()
            .map_err(|items: Vec<Value>| DecodeError::WrongLength(items.len()))?;
        match kind {
            Value::String(kind) => Ok(Self { kind, payload }),
            other => Err(DecodeError::InvalidKind(json_type_name(&other))),
        }
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> String {
        encode(&self.kind, &self.payload)
    }

    /// The envelope as a JSON array value.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::String(self.kind.clone()),
            self.payload.clone(),
        ])
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.kind)?;
        pair.serialize_element(&self.payload)?;
        pair.end()
    }
}

/// Encode a `(kind, payload)` pair as a compact JSON array.
pub fn encode(kind: &str, payload: &Value) -> String {
    Value::Array(vec![Value::String(kind.to_owned()), payload.clone()]).to_string()
}

/// Decode a raw inbound frame. See [`Envelope::decode`].
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    Envelope::decode(raw)
}

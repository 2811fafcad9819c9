//! Error types shared across the session and its collaborators.
//!
//! Each variant family maps to one entry of the session error taxonomy:
//! decode failures and persistence failures are surfaced to the client as
//! envelopes, delivery failures are only logged, and subscription failures
//! keep the session unauthenticated.

use thiserror::Error;

/// Inbound frame could not be turned into an [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not well-formed JSON.
    #[error("invalid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but not an array.
    #[error("expected a [kind, payload] array, got {0}")]
    NotAnArray(&'static str),

    /// An array of the wrong length.
    #[error("expected a [kind, payload] array of 2 elements, got {0}")]
    WrongLength(usize),

    /// First element is not usable as a kind tag.
    #[error("envelope kind must be a string, got {0}")]
    InvalidKind(&'static str),
}

/// The transport could not deliver a frame to the client.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,

    /// The underlying socket rejected the write.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The event store failed to persist an event.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The store client was already closed.
    #[error("store client closed")]
    Closed,

    /// The serialized event was rejected before reaching the backend.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The pub/sub client refused a subscription.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The pub/sub client was already closed.
    #[error("pub/sub client closed")]
    Closed,

    /// Backend failure.
    #[error("pub/sub backend error: {0}")]
    Backend(String),
}

/// Name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display() {
        let err: DecodeError = serde_json::from_str::<serde_json::Value>("foo")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("invalid JSON"));
    }

    #[test]
    fn wrong_length_display() {
        let err = DecodeError::WrongLength(3);
        assert_eq!(
            err.to_string(),
            "expected a [kind, payload] array of 2 elements, got 3"
        );
    }

    #[test]
    fn persistence_display() {
        assert_eq!(PersistenceError::Closed.to_string(), "store client closed");
        assert_eq!(
            PersistenceError::Backend("disk full".into()).to_string(),
            "store backend error: disk full"
        );
    }

    #[test]
    fn type_names() {
        assert_eq!(json_type_name(&serde_json::json!(null)), "null");
        assert_eq!(json_type_name(&serde_json::json!({"a": 1})), "object");
        assert_eq!(json_type_name(&serde_json::json!([1])), "array");
    }
}

//! Collaborator seams consumed by the session.
//!
//! The session owns one handle of each for its lifetime and never builds
//! them itself. Concrete implementations live in `hermes-auth`,
//! `hermes-store`, `hermes-bus`, and `hermes-server`; in-memory doubles live
//! in `hermes_session::testing`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{DeliveryError, PersistenceError, SubscribeError};
use crate::ids::Identity;

/// Maps a client-supplied token to an identity.
///
/// Pure: no I/O, no panics. A rejected token yields `None`.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the identity it names.
    fn verify(&self, token: &Value) -> Option<Identity>;
}

/// Persists serialized events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one serialized [`StoredEvent`](crate::StoredEvent).
    async fn save(&self, event: String) -> Result<(), PersistenceError>;

    /// Release the client. Later saves fail.
    async fn close(&self);
}

/// Callback invoked once per message delivered on a subscribed channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one published message.
    async fn handle(&self, message: String);
}

/// Subscribes handlers to channels on a publish/subscribe bus.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Deliver every message published on `channel` to `handler`, in order.
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError>;

    /// Drop all subscriptions and release the client.
    async fn close(&self);
}

/// Client-facing side of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text frame and report whether it was delivered.
    async fn send(&self, payload: String) -> Result<(), DeliveryError>;
}

/// Any `Fn(&Value) -> Option<Identity>` is a verifier.
impl<F> TokenVerifier for F
where
    F: Fn(&Value) -> Option<Identity> + Send + Sync,
{
    fn verify(&self, token: &Value) -> Option<Identity> {
        self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn password_verifier(token: &Value) -> Option<Identity> {
        (token == "password").then(|| Identity::from("userId"))
    }

    #[test]
    fn closures_are_verifiers() {
        let verifier: Arc<dyn TokenVerifier> = Arc::new(password_verifier);
        assert_eq!(verifier.verify(&json!("password")), Some(Identity::from("userId")));
        assert_eq!(verifier.verify(&json!("foo")), None);
        assert_eq!(verifier.verify(&json!(42)), None);
    }
}

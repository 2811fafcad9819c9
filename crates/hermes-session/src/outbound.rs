//! The send primitive shared by the session and its relay.

use std::sync::Arc;

use hermes_core::{ConnectionId, Transport, encode};
use serde_json::Value;
use tracing::{debug, warn};

/// Sends frames to one client and logs the outcome.
///
/// Delivery failures are logged and swallowed; nothing is retried.
#[derive(Clone)]
pub struct Outbound {
    connection_id: ConnectionId,
    transport: Arc<dyn Transport>,
}

impl Outbound {
    /// Wrap `transport` for `connection_id`.
    pub fn new(connection_id: ConnectionId, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection_id,
            transport,
        }
    }

    /// Connection this sender belongs to.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Send a raw frame.
    pub async fn send(&self, payload: String) {
        match self.transport.send(payload.clone()).await {
            Ok(()) => debug!(connection_id = %self.connection_id, payload = %payload, "message sent"),
            Err(err) => warn!(
                connection_id = %self.connection_id,
                payload = %payload,
                error = %err,
                "failed to send message"
            ),
        }
    }

    /// Send a `[kind, data]` envelope.
    pub async fn send_event(&self, kind: &str, data: &Value) {
        self.send(encode(kind, data)).await;
    }
}

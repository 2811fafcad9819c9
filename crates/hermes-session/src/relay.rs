//! Bus-to-client forwarding.

use async_trait::async_trait;
use hermes_core::MessageHandler;
use tracing::debug;

use crate::outbound::Outbound;

/// Forwards every message published on the session's channel to the client
/// unchanged. No envelope is added.
#[derive(Clone)]
pub struct Relay {
    outbound: Outbound,
}

impl Relay {
    /// Relay through `outbound`.
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl MessageHandler for Relay {
    async fn handle(&self, message: String) {
        debug!(
            connection_id = %self.outbound.connection_id(),
            payload = %message,
            "relaying message"
        );
        self.outbound.send(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hermes_core::ConnectionId;

    use crate::testing::RecordingTransport;

    #[tokio::test]
    async fn forwards_byte_identical() {
        let transport = Arc::new(RecordingTransport::new());
        let relay = Relay::new(Outbound::new(ConnectionId::from("c1"), transport.clone()));
        let published = r#"{"foo":"bar"}"#;
        relay.handle(published.to_owned()).await;
        relay.handle("  not json, still forwarded ".to_owned()).await;
        assert_eq!(
            transport.sent(),
            [published, "  not json, still forwarded "]
        );
    }
}

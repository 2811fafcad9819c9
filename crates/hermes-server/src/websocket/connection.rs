//! Per-connection transport and liveness state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use hermes_core::{ConnectionId, DeliveryError, Transport};
use tokio::sync::{mpsc, oneshot};

/// One frame queued for the writer task, with a slot for its outcome.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Text to write.
    pub text: String,
    /// Receives the write result.
    pub ack: oneshot::Sender<Result<(), DeliveryError>>,
}

impl OutboundFrame {
    /// Report the write outcome. The sender may have given up waiting.
    pub fn complete(self, result: Result<(), DeliveryError>) {
        let _ = self.ack.send(result);
    }
}

/// A connected client: the session's [`Transport`] and the heartbeat's
/// liveness record.
pub struct ClientConnection {
    /// Connection identifier.
    pub id: ConnectionId,
    tx: mpsc::Sender<OutboundFrame>,
    is_alive: AtomicBool,
    frames_sent: AtomicU64,
}

impl ClientConnection {
    /// Create a connection whose writes go to `tx`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id,
            tx,
            is_alive: AtomicBool::new(true),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Record client activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Return whether the client was active since the last check, and
    /// reset the flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Frames written successfully.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for ClientConnection {
    async fn send(&self, payload: String) -> Result<(), DeliveryError> {
        let (ack, outcome) = oneshot::channel();
        self.tx
            .send(OutboundFrame { text: payload, ack })
            .await
            .map_err(|_| DeliveryError::Closed)?;
        // a dropped ack means the writer exited before writing
        outcome.await.map_err(|_| DeliveryError::Closed)??;
        let _ = self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

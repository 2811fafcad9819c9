//! Per-session bus client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hermes_core::{MessageHandler, PubSub, SubscribeError};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::Bus;

struct Subscription {
    channel: String,
    task: JoinHandle<()>,
}

/// Owns a subscription task's receiver. Dropping it releases the receiver
/// and then prunes the channel, so an aborted task cleans up after itself.
struct ReceiverGuard {
    rx: Option<broadcast::Receiver<String>>,
    bus: Bus,
    channel: String,
}

impl ReceiverGuard {
    async fn recv(&mut self) -> Result<String, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for ReceiverGuard {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.bus.prune(&self.channel);
    }
}

/// A [`PubSub`] handle owned by one session.
///
/// Every subscription runs its own task that drains the channel in publish
/// order and awaits the handler for each message before taking the next.
pub struct BusClient {
    bus: Bus,
    subscriptions: Mutex<Vec<Subscription>>,
    closed: AtomicBool,
}

impl BusClient {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            bus,
            subscriptions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PubSub for BusClient {
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        let mut subscriptions = self.subscriptions.lock();
        if self.is_closed() {
            return Err(SubscribeError::Closed);
        }
        let mut rx = ReceiverGuard {
            rx: Some(self.bus.receiver(channel)),
            bus: self.bus.clone(),
            channel: channel.to_owned(),
        };
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => handler.handle(message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %rx.channel, skipped, "subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        subscriptions.push(Subscription {
            channel: channel.to_owned(),
            task,
        });
        debug!(channel, "subscribed");
        Ok(())
    }

    async fn close(&self) {
        let drained = {
            let mut subscriptions = self.subscriptions.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *subscriptions)
        };
        for sub in drained {
            sub.task.abort();
            // the task prunes its channel as it unwinds
            let _ = sub.task.await;
            debug!(channel = %sub.channel, "unsubscribed");
        }
        debug!("bus client closed");
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        for sub in self.subscriptions.get_mut().drain(..) {
            sub.task.abort();
        }
    }
}

//! Channel registry and publishing.

use std::sync::Arc;

use dashmap::DashMap;
use hermes_settings::BusSettings;
use tokio::sync::broadcast;
use tracing::debug;

use crate::client::BusClient;

struct Inner {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

/// Process-wide pub/sub bus. Cheap to clone.
///
/// A channel exists while it has at least one subscriber. Publishing to a
/// channel nobody listens on is a no-op.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    /// Create a bus buffering `capacity` messages per channel.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Create a bus from the `bus` settings section.
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::new(settings.channel_capacity)
    }

    /// Publish `message` on `channel`. Returns how many subscribers it
    /// reached.
    pub fn publish(&self, channel: &str, message: impl Into<String>) -> usize {
        let reached = self
            .inner
            .channels
            .get(channel)
            .map_or(0, |tx| tx.send(message.into()).unwrap_or(0));
        debug!(channel, reached, "published");
        reached
    }

    /// A fresh client with no subscriptions.
    pub fn client(&self) -> BusClient {
        BusClient::new(self.clone())
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Channels with at least one subscription.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    pub(crate) fn receiver(&self, channel: &str) -> broadcast::Receiver<String> {
        // Subscribing under the entry lock keeps `prune` from removing the
        // sender between lookup and subscribe.
        self.inner
            .channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    pub(crate) fn prune(&self, channel: &str) {
        if self
            .inner
            .channels
            .remove_if(channel, |_, tx| tx.receiver_count() == 0)
            .is_some()
        {
            debug!(channel, "channel pruned");
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::from_settings(&BusSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let bus = Bus::new(4);
        assert_eq!(bus.publish("userId", "hello"), 0);
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn receivers_get_published_messages() {
        let bus = Bus::new(4);
        let mut rx = bus.receiver("userId");
        assert_eq!(bus.subscriber_count("userId"), 1);
        assert_eq!(bus.publish("userId", "hello"), 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn channels_are_isolated() {
        let bus = Bus::new(4);
        let _a = bus.receiver("a");
        assert_eq!(bus.publish("b", "x"), 0);
        assert_eq!(bus.publish("a", "x"), 1);
    }

    #[test]
    fn prune_keeps_channels_with_receivers() {
        let bus = Bus::new(4);
        let rx = bus.receiver("a");
        bus.prune("a");
        assert_eq!(bus.channel_count(), 1);
        drop(rx);
        bus.prune("a");
        assert_eq!(bus.channel_count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let _rx = bus.receiver("a");
        assert_eq!(bus.publish("a", "x"), 1);
    }
}

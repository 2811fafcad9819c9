//! In-memory collaborator doubles.
//!
//! Each double records what the session did to it so tests can assert on
//! calls without a socket, database, or bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hermes_core::{
    DeliveryError, EventStore, MessageHandler, PersistenceError, PubSub, SubscribeError,
    Transport,
};
use parking_lot::Mutex;
use serde_json::Value;

/// Records every frame sent; optionally fails every send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingTransport {
    /// A transport that delivers everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose sends all fail with [`DeliveryError::Closed`].
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    /// Frames delivered so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Delivered frames parsed as JSON. Non-JSON frames become strings.
    pub fn sent_values(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
            .collect()
    }

    /// Send calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, payload: String) -> Result<(), DeliveryError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Closed);
        }
        self.sent.lock().push(payload);
        Ok(())
    }
}

/// Records saved events; optionally fails every save.
#[derive(Default)]
pub struct RecordingStore {
    saved: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl RecordingStore {
    /// A store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose saves fail with a backend error carrying `message`.
    pub fn failing(message: &str) -> Self {
        let store = Self::default();
        *store.failure.lock() = Some(message.to_owned());
        store
    }

    /// Events saved so far, serialized.
    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().clone()
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for RecordingStore {
    async fn save(&self, event: String) -> Result<(), PersistenceError> {
        if self.is_closed() {
            return Err(PersistenceError::Closed);
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(PersistenceError::Backend(message));
        }
        self.saved.lock().push(event);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records subscriptions and lets tests publish to them.
#[derive(Default)]
pub struct RecordingPubSub {
    subscriptions: Mutex<Vec<(String, Arc<dyn MessageHandler>)>>,
    refuse: AtomicBool,
    closed: AtomicBool,
}

impl RecordingPubSub {
    /// A bus that accepts every subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that refuses every subscription.
    pub fn refusing() -> Self {
        let pubsub = Self::default();
        pubsub.refuse.store(true, Ordering::SeqCst);
        pubsub
    }

    /// Subscribed channel names, in subscription order.
    pub fn channels(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hand `message` to every handler subscribed on `channel`. Returns how
    /// many handlers ran.
    pub async fn deliver(&self, channel: &str, message: &str) -> usize {
        let handlers: Vec<_> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in &handlers {
            handler.handle(message.to_owned()).await;
        }
        handlers.len()
    }
}

#[async_trait]
impl PubSub for RecordingPubSub {
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SubscribeError> {
        if self.is_closed() {
            return Err(SubscribeError::Closed);
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SubscribeError::Backend("subscription refused".into()));
        }
        self.subscriptions.lock().push((channel.to_owned(), handler));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions.lock().clear();
    }
}

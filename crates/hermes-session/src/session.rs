//! The per-connection session state machine.
//!
//! A session starts unauthenticated. The first accepted `authenticate`
//! subscribes the identity's channel and moves it, irreversibly, to the
//! authenticated state. Until then every other envelope is bounced back as
//! `unauthenticated-message-received`; afterwards every non-auth envelope
//! is persisted as a [`StoredEvent`].

use std::fmt::Display;
use std::sync::Arc;

use hermes_core::envelope::kinds;
use hermes_core::{
    ConnectionId, Envelope, EventStore, Identity, PubSub, StoredEvent, TokenVerifier, Transport,
};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::outbound::Outbound;
use crate::relay::Relay;

/// State and collaborators for one client connection.
pub struct Session {
    connection_id: ConnectionId,
    identity: Option<Identity>,
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<dyn EventStore>,
    pubsub: Arc<dyn PubSub>,
    outbound: Outbound,
}

impl Session {
    /// Build an unauthenticated session around its collaborators.
    pub fn new(
        connection_id: ConnectionId,
        verifier: Arc<dyn TokenVerifier>,
        store: Arc<dyn EventStore>,
        pubsub: Arc<dyn PubSub>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let outbound = Outbound::new(connection_id.clone(), transport);
        Self {
            connection_id,
            identity: None,
            verifier,
            store,
            pubsub,
            outbound,
        }
    }

    /// Connection this session serves.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Authenticated identity, once set.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Whether authentication has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Handle one inbound frame. Frames must be fed in arrival order.
    pub async fn handle_inbound(&mut self, raw: &str) {
        info!(connection_id = %self.connection_id, raw, "message received");

        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    connection_id = %self.connection_id,
                    raw,
                    error = %err,
                    "unable to parse message"
                );
                self.outbound
                    .send_event(kinds::UNABLE_TO_PARSE_JSON_ERROR, &Value::String(raw.to_owned()))
                    .await;
                return;
            }
        };

        if envelope.kind == kinds::AUTHENTICATE {
            self.authenticate(envelope.payload).await;
        } else if self.is_authenticated() {
            self.persist(envelope).await;
        } else {
            warn!(
                connection_id = %self.connection_id,
                kind = %envelope.kind,
                "unauthenticated message received"
            );
            self.outbound
                .send_event(kinds::UNAUTHENTICATED_MESSAGE_RECEIVED, &envelope.to_value())
                .await;
        }
    }

    async fn authenticate(&mut self, token: Value) {
        if let Some(identity) = &self.identity {
            warn!(
                connection_id = %self.connection_id,
                identity = %identity,
                "already authenticated"
            );
            self.outbound
                .send_event(kinds::ALREADY_AUTHENTICATED, &Value::String(identity.to_string()))
                .await;
            return;
        }

        let Some(identity) = self.verifier.verify(&token) else {
            self.outbound
                .send_event(kinds::AUTHENTICATION_FAILED, &json!({ "token": token }))
                .await;
            warn!(connection_id = %self.connection_id, token = %token, "authentication failed");
            return;
        };

        let relay = Arc::new(Relay::new(self.outbound.clone()));
        if let Err(err) = self.pubsub.subscribe(identity.channel(), relay).await {
            error!(
                connection_id = %self.connection_id,
                identity = %identity,
                error = %err,
                "subscription failed"
            );
            self.outbound
                .send_event(kinds::SUBSCRIPTION_FAILED, &json!({ "identity": identity.as_str() }))
                .await;
            return;
        }

        info!(connection_id = %self.connection_id, identity = %identity, "user authenticated");
        info!(connection_id = %self.connection_id, channel = identity.channel(), "subscribed");
        let payload = Value::String(identity.to_string());
        self.identity = Some(identity);
        self.outbound
            .send_event(kinds::USER_AUTHENTICATED, &payload)
            .await;
    }

    async fn persist(&self, envelope: Envelope) {
        let event = StoredEvent::capture(envelope.kind, envelope.payload);
        let result = match event.to_json() {
            Ok(serialized) => self
                .store
                .save(serialized.clone())
                .await
                .map(|()| serialized)
                .map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match result {
            Ok(serialized) => {
                info!(connection_id = %self.connection_id, event = %serialized, "event saved");
                self.outbound.send_event(kinds::EVENT_SAVED, &Value::Null).await;
            }
            Err(err) => {
                warn!(
                    connection_id = %self.connection_id,
                    name = %event.name,
                    error = %err,
                    "failed to save event"
                );
                self.outbound
                    .send_event(
                        kinds::EVENT_SAVE_FAILED,
                        &json!({ "name": event.name, "error": err }),
                    )
                    .await;
            }
        }
    }

    /// Log a transport error. Resources stay open until [`close`](Self::close).
    pub fn on_error(&self, err: &dyn Display) {
        error!(connection_id = %self.connection_id, error = %err, "connection error");
    }

    /// Release the store client, then the pub/sub client.
    ///
    /// Consumes the session, so it runs at most once.
    pub async fn close(self) {
        debug!(connection_id = %self.connection_id, "closing session");
        self.store.close().await;
        self.pubsub.close().await;
        info!(
            connection_id = %self.connection_id,
            identity = self.identity.as_ref().map(Identity::as_str),
            "session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hermes_core::logging::capture_logs;
    use hermes_core::{MessageHandler, PersistenceError, SubscribeError};
    use mockall::{Sequence, mock};
    use tracing::Level;

    use crate::testing::{RecordingPubSub, RecordingStore, RecordingTransport};

    fn password_verifier(token: &Value) -> Option<Identity> {
        (token == "password").then(|| Identity::from("userId"))
    }

    struct Fixture {
        session: Session,
        transport: Arc<RecordingTransport>,
        store: Arc<RecordingStore>,
        pubsub: Arc<RecordingPubSub>,
    }

    fn fixture_with(
        transport: RecordingTransport,
        store: RecordingStore,
        pubsub: RecordingPubSub,
    ) -> Fixture {
        let transport = Arc::new(transport);
        let store = Arc::new(store);
        let pubsub = Arc::new(pubsub);
        let session = Session::new(
            ConnectionId::from("conn-1"),
            Arc::new(password_verifier),
            store.clone(),
            pubsub.clone(),
            transport.clone(),
        );
        Fixture {
            session,
            transport,
            store,
            pubsub,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            RecordingTransport::new(),
            RecordingStore::new(),
            RecordingPubSub::new(),
        )
    }

    async fn authenticated() -> Fixture {
        let mut f = fixture();
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;
        f
    }

    #[tokio::test]
    async fn malformed_input_is_reported_verbatim() {
        for raw in ["foo", "", "{}", "[]", r#"["authenticate"]"#, "[1,2]", r#"["a",1,2]"#] {
            let (logs, _guard) = capture_logs();
            let mut f = fixture();
            f.session.handle_inbound(raw).await;

            assert_eq!(
                f.transport.sent(),
                [encode_pair(kinds::UNABLE_TO_PARSE_JSON_ERROR, &json!(raw))],
                "input {raw:?}"
            );
            assert!(f.pubsub.channels().is_empty());
            assert!(f.store.saved().is_empty());
            assert!(!f.session.is_authenticated());

            let warns = logs.at_level(Level::WARN);
            assert_eq!(warns.len(), 1);
            assert_eq!(warns[0].field("connection_id"), Some("conn-1"));
            assert_eq!(warns[0].field("raw"), Some(raw));
        }
    }

    #[tokio::test]
    async fn session_survives_parse_errors() {
        let mut f = fixture();
        f.session.handle_inbound("foo").await;
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;
        assert_eq!(f.session.identity(), Some(&Identity::from("userId")));
    }

    #[tokio::test]
    async fn event_before_auth_is_bounced() {
        let mut f = fixture();
        f.session.handle_inbound(r#"["book-viewed","book-id"]"#).await;

        assert_eq!(
            f.transport.sent_values(),
            [json!(["unauthenticated-message-received", ["book-viewed", "book-id"]])]
        );
        assert!(f.store.saved().is_empty());
    }

    #[tokio::test]
    async fn accepted_token_authenticates_and_subscribes() {
        let (logs, _guard) = capture_logs();
        let f = authenticated().await;

        assert_eq!(f.session.identity(), Some(&Identity::from("userId")));
        assert_eq!(f.pubsub.channels(), ["userId"]);
        assert_eq!(f.transport.sent(), [r#"["user-authenticated","userId"]"#]);

        let info = logs
            .at_level(Level::INFO)
            .into_iter()
            .find(|e| e.message == "user authenticated")
            .unwrap();
        assert_eq!(info.field("connection_id"), Some("conn-1"));
        assert_eq!(info.field("identity"), Some("userId"));

        let subscribed = logs
            .at_level(Level::INFO)
            .into_iter()
            .find(|e| e.message == "subscribed")
            .unwrap();
        assert_eq!(subscribed.field("channel"), Some("userId"));
    }

    #[tokio::test]
    async fn rejected_token_leaves_session_unauthenticated() {
        let (logs, _guard) = capture_logs();
        let mut f = fixture();
        f.session.handle_inbound(r#"["authenticate","foo"]"#).await;

        assert_eq!(
            f.transport.sent_values(),
            [json!(["authentication-failed", {"token": "foo"}])]
        );
        assert!(f.session.identity().is_none());
        assert!(f.pubsub.channels().is_empty());
        assert!(logs.has_event(Level::WARN, "authentication failed"));
    }

    #[tokio::test]
    async fn non_string_token_is_echoed_structurally() {
        let mut f = fixture();
        f.session.handle_inbound(r#"["authenticate",{"jwt":42}]"#).await;
        assert_eq!(
            f.transport.sent_values(),
            [json!(["authentication-failed", {"token": {"jwt": 42}}])]
        );
    }

    #[tokio::test]
    async fn authenticated_event_is_persisted() {
        let mut f = authenticated().await;
        f.session.handle_inbound(r#"["book-viewed","book-id"]"#).await;

        let saved = f.store.saved();
        assert_eq!(saved.len(), 1);
        let event: StoredEvent = serde_json::from_str(&saved[0]).unwrap();
        assert_eq!(event.name, "book-viewed");
        assert_eq!(event.source, hermes_core::EVENT_SOURCE);
        assert_eq!(event.data, json!("book-id"));
        let raw: Value = serde_json::from_str(&saved[0]).unwrap();
        assert!(raw["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(raw["src"], "hermes");

        assert_eq!(f.transport.sent().last().unwrap(), r#"["event-saved",null]"#);
        assert_eq!(f.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn events_are_persisted_in_arrival_order() {
        let mut f = authenticated().await;
        for name in ["first", "second", "third"] {
            f.session.handle_inbound(&format!(r#"["{name}",null]"#)).await;
        }
        let names: Vec<String> = f
            .store
            .saved()
            .iter()
            .map(|s| serde_json::from_str::<StoredEvent>(s).unwrap().name)
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn published_message_is_relayed_verbatim() {
        let f = authenticated().await;
        let (logs, _guard) = capture_logs();
        let published = r#"{"foo":"bar"}"#;
        assert_eq!(f.pubsub.deliver("userId", published).await, 1);
        assert_eq!(f.transport.sent().last().unwrap(), published);

        let relayed = logs
            .at_level(Level::DEBUG)
            .into_iter()
            .find(|e| e.message == "relaying message")
            .unwrap();
        assert_eq!(relayed.field("connection_id"), Some("conn-1"));
        assert_eq!(relayed.field("payload"), Some(published));
    }

    #[tokio::test]
    async fn second_authenticate_is_refused() {
        let mut f = authenticated().await;
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;

        assert_eq!(f.pubsub.channels(), ["userId"]);
        assert!(f.store.saved().is_empty());
        assert_eq!(
            f.transport.sent().last().unwrap(),
            r#"["already-authenticated","userId"]"#
        );
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let (logs, _guard) = capture_logs();
        let mut f = fixture_with(
            RecordingTransport::new(),
            RecordingStore::failing("disk full"),
            RecordingPubSub::new(),
        );
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;
        f.session.handle_inbound(r#"["book-viewed","book-id"]"#).await;

        let last = f.transport.sent_values().pop().unwrap();
        assert_eq!(last[0], "event-save-failed");
        assert_eq!(last[1]["name"], "book-viewed");
        assert!(last[1]["error"].as_str().unwrap().contains("disk full"));
        assert!(logs.has_event(Level::WARN, "failed to save event"));
    }

    #[tokio::test]
    async fn subscription_failure_keeps_session_unauthenticated() {
        let (logs, _guard) = capture_logs();
        let mut f = fixture_with(
            RecordingTransport::new(),
            RecordingStore::new(),
            RecordingPubSub::refusing(),
        );
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;

        assert!(f.session.identity().is_none());
        assert_eq!(
            f.transport.sent_values(),
            [json!(["subscription-failed", {"identity": "userId"}])]
        );
        assert!(logs.has_event(Level::ERROR, "subscription failed"));

        f.session.handle_inbound(r#"["book-viewed","book-id"]"#).await;
        assert!(f.store.saved().is_empty());
        assert_eq!(
            f.transport.sent_values().last().unwrap()[0],
            "unauthenticated-message-received"
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_logged_only() {
        let (logs, _guard) = capture_logs();
        let mut f = fixture_with(
            RecordingTransport::failing(),
            RecordingStore::new(),
            RecordingPubSub::new(),
        );
        f.session.handle_inbound(r#"["authenticate","password"]"#).await;

        assert!(f.session.is_authenticated());
        assert_eq!(f.transport.attempts(), 1);
        assert!(logs.has_event(Level::WARN, "failed to send message"));
    }

    #[tokio::test]
    async fn close_releases_collaborators() {
        let (logs, _guard) = capture_logs();
        let f = authenticated().await;
        let (store, pubsub) = (f.store.clone(), f.pubsub.clone());
        f.session.close().await;

        assert!(store.is_closed());
        assert!(pubsub.is_closed());

        let events = logs.events();
        let closing = events
            .iter()
            .position(|e| e.level == Level::DEBUG && e.message == "closing session")
            .unwrap();
        let closed = events
            .iter()
            .position(|e| e.level == Level::INFO && e.message == "session closed")
            .unwrap();
        assert!(closing < closed);
        assert_eq!(events[closing].field("connection_id"), Some("conn-1"));
        assert_eq!(events[closed].field("connection_id"), Some("conn-1"));
        assert_eq!(events[closed].field("identity"), Some("userId"));
    }

    #[tokio::test]
    async fn on_error_logs_without_closing() {
        let (logs, _guard) = capture_logs();
        let f = fixture();
        f.session.on_error(&"connection reset");

        let errors = logs.at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field("connection_id"), Some("conn-1"));
        assert_eq!(errors[0].field("error"), Some("connection reset"));
        assert!(!f.store.is_closed());
        assert!(!f.pubsub.is_closed());
    }

    fn encode_pair(kind: &str, payload: &Value) -> String {
        hermes_core::encode(kind, payload)
    }

    mock! {
        Store {}
        #[async_trait]
        impl EventStore for Store {
            async fn save(&self, event: String) -> Result<(), PersistenceError>;
            async fn close(&self);
        }
    }

    mock! {
        Bus {}
        #[async_trait]
        impl PubSub for Bus {
            async fn subscribe(
                &self,
                channel: &str,
                handler: Arc<dyn MessageHandler>,
            ) -> Result<(), SubscribeError>;
            async fn close(&self);
        }
    }

    fn mocked(store: MockStore, bus: MockBus) -> (Session, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = Session::new(
            ConnectionId::from("conn-1"),
            Arc::new(password_verifier),
            Arc::new(store),
            Arc::new(bus),
            transport.clone(),
        );
        (session, transport)
    }

    #[tokio::test]
    async fn close_releases_store_before_bus() {
        let mut seq = Sequence::new();
        let mut store = MockStore::new();
        let mut bus = MockBus::new();
        store
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        bus.expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let (session, _transport) = mocked(store, bus);
        session.close().await;
    }

    #[tokio::test]
    async fn subscribes_exactly_once_on_identity_channel() {
        let mut store = MockStore::new();
        let mut bus = MockBus::new();
        store.expect_save().never();
        bus.expect_subscribe()
            .withf(|channel, _| channel.to_string() == "userId")
            .times(1)
            .returning(|_, _| Ok(()));

        let (mut session, transport) = mocked(store, bus);
        session.handle_inbound(r#"["authenticate","password"]"#).await;
        session.handle_inbound(r#"["authenticate","password"]"#).await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn rejected_token_never_touches_collaborators() {
        let mut store = MockStore::new();
        let mut bus = MockBus::new();
        store.expect_save().never();
        bus.expect_subscribe().never();

        let (mut session, _transport) = mocked(store, bus);
        session.handle_inbound(r#"["authenticate","foo"]"#).await;
        session.handle_inbound(r#"["book-viewed","book-id"]"#).await;
    }
}

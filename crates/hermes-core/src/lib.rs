//! # hermes-core
//!
//! Shared vocabulary for the Hermes session bridge.
//!
//! - **Envelope**: the `[kind, payload]` wire unit and its codec
//! - **Stored events**: the record persisted for authenticated client events
//! - **Identifiers**: `ConnectionId` and `Identity` newtypes
//! - **Errors**: decode, delivery, persistence, and subscription failures
//! - **Traits**: the collaborator seams (`TokenVerifier`, `EventStore`,
//!   `PubSub`, `Transport`, `MessageHandler`)
//! - **Logging**: subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod event;
pub mod ids;
pub mod logging;
pub mod traits;

pub use envelope::{Envelope, decode, encode};
pub use errors::{DecodeError, DeliveryError, PersistenceError, SubscribeError};
pub use event::{EVENT_SOURCE, StoredEvent};
pub use ids::{ConnectionId, Identity};
pub use traits::{EventStore, MessageHandler, PubSub, TokenVerifier, Transport};

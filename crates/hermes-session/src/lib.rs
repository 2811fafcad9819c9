//! # hermes-session
//!
//! One [`Session`] per client connection. It routes inbound envelopes
//! (authenticate, then persist events), subscribes the authenticated
//! identity's channel with a [`Relay`] that forwards bus messages verbatim,
//! and releases its collaborators on close.
//!
//! The session never talks to a socket, database, or bus directly; it only
//! sees the traits in [`hermes_core::traits`]. In-memory doubles for all of
//! them live in [`testing`].

#![deny(unsafe_code)]

pub mod outbound;
pub mod relay;
pub mod session;
pub mod testing;

pub use outbound::Outbound;
pub use relay::Relay;
pub use session::Session;

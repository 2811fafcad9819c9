//! # hermes-store
//!
//! Event persistence for Hermes sessions.
//!
//! [`SqliteEventStore`] owns an r2d2 pool of `SQLite` connections and is
//! shared by the whole process. Each session gets its own [`StoreClient`]
//! from [`SqliteEventStore::client`]; closing a client does not affect the
//! pool or other sessions.

#![deny(unsafe_code)]

pub mod client;
pub mod connection;
pub mod errors;
pub mod migrations;
pub mod store;

pub use client::StoreClient;
pub use connection::{ConnectionConfig, ConnectionPool};
pub use errors::{Result, StoreError};
pub use store::{EventRecord, SqliteEventStore};

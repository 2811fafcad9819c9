//! # hermes-server
//!
//! Axum server that hosts one [`Session`](hermes_session::Session) per
//! WebSocket connection.
//!
//! - `GET /ws`: WebSocket upgrade, refused with 503 past `max_connections`
//! - `GET /health`: status, uptime, live connection count
//! - `GET /metrics`: Prometheus text format

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{HermesServer, SessionDeps};
pub use shutdown::ShutdownCoordinator;

//! WebSocket connection handling.

pub mod connection;
pub mod heartbeat;
pub mod session;

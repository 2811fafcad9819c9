//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs the keys it overrides.

use std::fmt;
use std::path::PathBuf;

use hermes_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HermesSettings {
    /// HTTP / WebSocket server.
    pub server: ServerSettings,
    /// Token verification.
    pub auth: AuthSettings,
    /// Event store.
    pub store: StoreSettings,
    /// In-process pub/sub bus.
    pub bus: BusSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HermesSettings {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.jwt_secret must not be empty".into(),
            ));
        }
        if self.auth.identity_claim.is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.identity_claim must not be empty".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.max_connections must be at least 1".into(),
            ));
        }
        if self.server.outbound_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outbound_queue must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0
            || self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs
        {
            return Err(SettingsError::InvalidValue(format!(
                "server heartbeat interval {}s / timeout {}s: interval must be positive and not exceed timeout",
                self.server.heartbeat_interval_secs, self.server.heartbeat_timeout_secs
            )));
        }
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.pool_size must be at least 1".into(),
            ));
        }
        if self.bus.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "bus.channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` to auto-assign).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Frames buffered per connection before senders wait.
    pub outbound_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            outbound_queue: 256,
        }
    }
}

/// JWT verification settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 shared secret.
    pub jwt_secret: String,
    /// Claim whose string value becomes the identity.
    pub identity_claim: String,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            identity_claim: "sub".to_string(),
            leeway_secs: 30,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"[redacted]")
            .field("identity_claim", &self.identity_claim)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Event store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database path. Relative paths resolve against `~/.hermes`.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "events.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 30_000,
        }
    }
}

impl StoreSettings {
    /// Absolute database path.
    pub fn resolved_db_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.db_path);
        if path.is_absolute() {
            path
        } else {
            crate::loader::hermes_home().join(path)
        }
    }
}

/// Pub/sub bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Messages buffered per channel before slow subscribers lag.
    pub channel_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

//! # hermes
//!
//! Session bridge server binary: loads settings, wires the verifier,
//! store, and bus into the WebSocket server, and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use hermes_auth::JwtVerifier;
use hermes_bus::Bus;
use hermes_core::logging::init_subscriber;
use hermes_server::{HermesServer, ServerConfig, SessionDeps};
use hermes_settings::HermesSettings;
use hermes_store::{ConnectionConfig, SqliteEventStore};

const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hermes session bridge.
#[derive(Parser, Debug)]
#[command(name = "hermes", about = "WebSocket session bridge: auth, event persistence, pub/sub relay")]
struct Cli {
    /// Settings file (default `~/.hermes/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `SQLite` event database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut HermesSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.store.db_path = path.to_string_lossy().into_owned();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(hermes_settings::settings_path);
    let mut settings = hermes_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply_overrides(&mut settings);
    settings.validate().context("Invalid settings")?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    tracing::debug!(?settings, "settings loaded");

    let metrics = hermes_server::metrics::install_recorder()?;

    let db_path = settings.store.resolved_db_path();
    let store = SqliteEventStore::open(&db_path, &ConnectionConfig::from(&settings.store))
        .with_context(|| format!("Failed to open event store at {}", db_path.display()))?;
    let verifier =
        JwtVerifier::from_settings(&settings.auth).context("Failed to build token verifier")?;
    let bus = Bus::from_settings(&settings.bus);

    let deps = SessionDeps {
        verifier: Arc::new(verifier),
        store,
        bus,
    };
    let server = HermesServer::new(ServerConfig::from(&settings.server), deps, metrics);
    let (addr, handle) = server.listen().await?;
    tracing::info!(%addr, db = %db_path.display(), "hermes ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    // live sockets finish their session teardown after the listener stops
    let deadline = Instant::now() + CONNECTION_DRAIN_TIMEOUT;
    while server.connection_count() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "hermes",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--db-path",
            "/tmp/hermes-test.db",
            "--log-level",
            "debug",
        ]);
        let mut settings = HermesSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.store.db_path, "/tmp/hermes-test.db");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["hermes"]);
        let mut settings = HermesSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.store.db_path, "events.db");
        assert!(cli.config.is_none());
    }

    #[test]
    fn config_flag_is_parsed() {
        let cli = Cli::parse_from(["hermes", "--config", "/etc/hermes.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/hermes.json")));
    }
}

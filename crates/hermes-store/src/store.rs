//! The shared `SQLite` event store.

use std::path::Path;

use chrono::SecondsFormat;
use hermes_core::StoredEvent;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::StoreClient;
use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::Result;
use crate::migrations;

/// One row of the `events` table.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    /// Row id (UUID v7).
    pub id: String,
    /// Event name.
    pub name: String,
    /// Origin tag (`src`).
    pub source: String,
    /// Capture time, RFC 3339.
    pub timestamp: String,
    /// The serialized event exactly as saved.
    pub body: String,
    /// Insert time, RFC 3339.
    pub created_at: String,
}

impl EventRecord {
    /// Parse the stored body back into an event.
    pub fn event(&self) -> Result<StoredEvent> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Pooled `SQLite` event store, cheap to clone.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: ConnectionPool,
}

impl SqliteEventStore {
    /// Open (creating if needed) a file-backed store and migrate it.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(?path, pool_size = config.pool_size, "opening event store");
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// Single-connection in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// Wrap an existing pool, applying pending migrations.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// A new per-session client.
    pub fn client(&self) -> StoreClient {
        StoreClient::new(self.clone())
    }

    /// Validate and insert one serialized event. Returns the new row id.
    ///
    /// Blocking; call from the blocking pool.
    pub fn insert(&self, body: &str) -> Result<String> {
        let event: StoredEvent = serde_json::from_str(body)?;
        let id = Uuid::now_v7().to_string();
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO events (id, name, src, timestamp, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                event.name,
                event.source,
                event
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                body,
            ],
        )?;
        debug!(id = %id, name = %event.name, "event inserted");
        Ok(id)
    }

    /// Number of stored events.
    pub fn count(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<EventRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, src, timestamp, body, created_at
             FROM events ORDER BY rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(EventRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                source: row.get(2)?,
                timestamp: row.get(3)?,
                body: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Look up one event by id.
    pub fn get(&self, id: &str) -> Result<Option<EventRecord>> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row(
                "SELECT id, name, src, timestamp, body, created_at FROM events WHERE id = ?1",
                params![id],
                |row| {
                    Ok(EventRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        source: row.get(2)?,
                        timestamp: row.get(3)?,
                        body: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }
}

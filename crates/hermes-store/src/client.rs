//! Per-session store client.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hermes_core::{EventStore, PersistenceError};
use tracing::debug;

use crate::errors::StoreError;
use crate::store::SqliteEventStore;

/// An [`EventStore`] handle owned by one session.
///
/// Saves run on the blocking pool. After [`close`](EventStore::close) every
/// save fails with [`PersistenceError::Closed`]; the shared store is not
/// affected.
pub struct StoreClient {
    store: SqliteEventStore,
    closed: AtomicBool,
}

impl StoreClient {
    pub(crate) fn new(store: SqliteEventStore) -> Self {
        Self {
            store,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EventStore for StoreClient {
    async fn save(&self, event: String) -> Result<(), PersistenceError> {
        if self.is_closed() {
            return Err(PersistenceError::Closed);
        }
        let store = self.store.clone();
        let _id = tokio::task::spawn_blocking(move || store.insert(&event))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))??;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("store client closed");
        }
    }
}

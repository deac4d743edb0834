// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot and cursor stores.
//!
//! The snapshot store is a durable, document-oriented copy of every catalog
//! entity, keyed by product id. It exists so a cache rebuild never has to
//! scan the relational source. The cursor store persists the last applied
//! change-log id so incremental sync resumes after a restart; a crash
//! between apply and persist re-reads a batch that was already applied,
//! which the idempotent-overwrite mutations make safe.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryCursorStore, MemorySnapshotStore};
pub use sqlite::SqliteStore;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::Product;
use crate::config::CacheConfig;
use crate::error::Result;

/// Durable, document-oriented copy of the catalog, keyed by product id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace documents by id.
    async fn upsert(&self, products: &[Product]) -> Result<()>;

    /// Which of the given ids already exist in the store.
    async fn existing_ids(&self, ids: &[u64]) -> Result<HashSet<u64>>;

    /// Delete documents by id. Missing ids are not an error.
    async fn delete_ids(&self, ids: &[u64]) -> Result<usize>;

    /// Page through all documents in ascending id order.
    /// Returns an empty vec when `offset` passes the end.
    async fn scan(&self, offset: u64, limit: usize) -> Result<Vec<Product>>;

    /// Total document count.
    async fn count(&self) -> Result<u64>;
}

/// Persists the last successfully applied change-log entry id.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor; 0 when nothing has been applied yet.
    async fn load(&self) -> Result<u64>;

    /// Persist the cursor.
    async fn store(&self, cursor: u64) -> Result<()>;
}

/// Build the stores a config asks for: one shared SQLite database when
/// `snapshot_db_url` is set, in-memory stores otherwise.
pub async fn from_config(
    config: &CacheConfig,
) -> Result<(Arc<dyn SnapshotStore>, Arc<dyn CursorStore>)> {
    match &config.snapshot_db_url {
        Some(url) => {
            let store = Arc::new(SqliteStore::new(url).await?);
            Ok((Arc::clone(&store) as Arc<dyn SnapshotStore>, store))
        }
        None => Ok((Arc::new(MemorySnapshotStore::new()), Arc::new(MemoryCursorStore::new()))),
    }
}

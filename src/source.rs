// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational source contract and change feed reader.
//!
//! The source of truth is consumed through three calls only: a paged bulk
//! scan for the full reimport, a count for statistics, and the append-only
//! change log for incremental sync. Implementations are expected to return
//! fully materialized products (attributes resolved against the global
//! taxonomy via [`crate::catalog::materialize_attributes`], skipping records
//! whose taxonomy lookup fails while the rest of the page continues).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::catalog::{ChangeLogEntry, Product};
use crate::error::Result;

/// Aggregate counts from the source (`getStatistics` contract).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceStatistics {
    pub count: u64,
}

/// The relational source of truth, consumed as a contract.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page of products. Pages are 1-based; an empty page marks
    /// the end of the scan.
    async fn get_page(&self, page: usize, per_page: usize) -> Result<Vec<Product>>;

    /// Total number of products in the source.
    async fn get_statistics(&self) -> Result<SourceStatistics>;

    /// Change-log entries with id strictly greater than `cursor`, ascending,
    /// at most `limit`.
    async fn get_changes_since(&self, cursor: u64, limit: usize) -> Result<Vec<ChangeLogEntry>>;
}

/// Polls the append-only change log since a cursor.
///
/// The reader never mutates the cursor; the worker persists it only after a
/// batch has been applied. An empty batch is a normal result, not an error.
pub struct FeedReader {
    source: Arc<dyn CatalogSource>,
}

impl FeedReader {
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Fetch up to `limit` entries with id strictly greater than `since`.
    ///
    /// The feed contract guarantees ascending, strictly-greater ids; a
    /// source that violates it gets its batch normalized here (dropped
    /// stale ids, re-sorted) with a warning, so the worker's ordering
    /// invariant holds regardless.
    pub async fn poll_changes(&self, since: u64, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let mut entries = self.source.get_changes_since(since, limit).await?;

        let before = entries.len();
        entries.retain(|e| e.id > since);
        if entries.len() != before {
            warn!(since, dropped = before - entries.len(), "source returned stale change ids");
        }
        if !entries.windows(2).all(|w| w[0].id < w[1].id) {
            warn!(since, "source returned out-of-order change ids; sorting");
            entries.sort_by_key(|e| e.id);
            entries.dedup_by_key(|e| e.id);
        }
        entries.truncate(limit);

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChangeField;
    use crate::error::CacheError;

    struct FakeSource {
        entries: Vec<ChangeLogEntry>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogSource for FakeSource {
        async fn get_page(&self, _page: usize, _per_page: usize) -> Result<Vec<Product>> {
            Ok(vec![])
        }

        async fn get_statistics(&self) -> Result<SourceStatistics> {
            Ok(SourceStatistics { count: 0 })
        }

        async fn get_changes_since(&self, _cursor: u64, _limit: usize) -> Result<Vec<ChangeLogEntry>> {
            if self.fail {
                return Err(CacheError::source("get_changes_since", "connection refused"));
            }
            Ok(self.entries.clone())
        }
    }

    fn entry(id: u64) -> ChangeLogEntry {
        ChangeLogEntry { id, target_id: 1, field: ChangeField::Stock, value: "5".into() }
    }

    #[tokio::test]
    async fn empty_feed_is_not_an_error() {
        let reader = FeedReader::new(Arc::new(FakeSource { entries: vec![], fail: false }));
        let entries = reader.poll_changes(0, 100).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn drops_stale_and_sorts_out_of_order_entries() {
        let reader = FeedReader::new(Arc::new(FakeSource {
            entries: vec![entry(5), entry(3), entry(9), entry(7)],
            fail: false,
        }));
        let entries = reader.poll_changes(4, 100).await.unwrap();
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 7, 9]);
    }

    #[tokio::test]
    async fn truncates_to_limit() {
        let reader = FeedReader::new(Arc::new(FakeSource {
            entries: (1..=10).map(entry).collect(),
            fail: false,
        }));
        let entries = reader.poll_changes(0, 3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries.last().unwrap().id, 3);
    }

    #[tokio::test]
    async fn connectivity_failure_is_retryable() {
        let reader = FeedReader::new(Arc::new(FakeSource { entries: vec![], fail: true }));
        let err = reader.poll_changes(0, 100).await.unwrap_err();
        assert!(err.is_retryable());
    }
}

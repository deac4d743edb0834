// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory snapshot and cursor stores.
//!
//! Used when no `snapshot_db_url` is configured, and as test doubles.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CursorStore, SnapshotStore};
use crate::catalog::Product;
use crate::error::Result;

pub struct MemorySnapshotStore {
    data: DashMap<u64, Product>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self { data: DashMap::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn upsert(&self, products: &[Product]) -> Result<()> {
        for product in products {
            self.data.insert(product.id, product.clone());
        }
        Ok(())
    }

    async fn existing_ids(&self, ids: &[u64]) -> Result<HashSet<u64>> {
        Ok(ids.iter().copied().filter(|id| self.data.contains_key(id)).collect())
    }

    async fn delete_ids(&self, ids: &[u64]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            if self.data.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn scan(&self, offset: u64, limit: usize) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.data.iter().map(|r| r.value().clone()).collect();
        products.sort_by_key(|p| p.id);
        Ok(products.into_iter().skip(offset as usize).take(limit).collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

pub struct MemoryCursorStore {
    position: AtomicU64,
}

impl MemoryCursorStore {
    #[must_use]
    pub fn new() -> Self {
        Self { position: AtomicU64::new(0) }
    }
}

impl Default for MemoryCursorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<u64> {
        Ok(self.position.load(Ordering::Acquire))
    }

    async fn store(&self, cursor: u64) -> Result<()> {
        self.position.store(cursor, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Product, ProductKind};
    use chrono::{TimeZone, Utc};

    fn product(id: u64) -> Product {
        Product {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            description: String::new(),
            kind: ProductKind::Simple,
            price: Some(10.0),
            stock_quantity: Some(1),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            price_circulations: None,
            categories: vec![],
            images: vec![],
            attributes: vec![],
            default_attributes: vec![],
            variations: vec![],
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = MemorySnapshotStore::new();
        store.upsert(&[product(1)]).await.unwrap();

        let mut updated = product(1);
        updated.price = Some(99.0);
        store.upsert(&[updated]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let scanned = store.scan(0, 10).await.unwrap();
        assert_eq!(scanned[0].price, Some(99.0));
    }

    #[tokio::test]
    async fn existing_ids_filters_to_present() {
        let store = MemorySnapshotStore::new();
        store.upsert(&[product(1), product(3)]).await.unwrap();

        let existing = store.existing_ids(&[1, 2, 3, 4]).await.unwrap();
        assert!(existing.contains(&1));
        assert!(existing.contains(&3));
        assert_eq!(existing.len(), 2);
    }

    #[tokio::test]
    async fn scan_pages_in_id_order() {
        let store = MemorySnapshotStore::new();
        store.upsert(&[product(3), product(1), product(2)]).await.unwrap();

        let first = store.scan(0, 2).await.unwrap();
        assert_eq!(first.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        let rest = store.scan(2, 2).await.unwrap();
        assert_eq!(rest.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3]);
        assert!(store.scan(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_ids_reports_removed_count() {
        let store = MemorySnapshotStore::new();
        store.upsert(&[product(1), product(2)]).await.unwrap();

        let deleted = store.delete_ids(&[1, 99]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load().await.unwrap(), 0);
        store.store(42).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 42);
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite snapshot and cursor store.
//!
//! One database file carries both tables:
//!
//! ```sql
//! CREATE TABLE products (
//!   id  INTEGER PRIMARY KEY,
//!   doc TEXT NOT NULL          -- full product document as JSON
//! );
//! CREATE TABLE sync_cursor (
//!   id       INTEGER PRIMARY KEY CHECK (id = 0),  -- single row
//!   position INTEGER NOT NULL
//! );
//! ```
//!
//! Documents are stored as JSON text; the snapshot store is a reseed source
//! for generation rebuilds, not a query surface, so no per-field columns are
//! needed. WAL mode keeps cursor writes from blocking snapshot scans.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use super::{CursorStore, SnapshotStore};
use crate::catalog::Product;
use crate::error::{CacheError, Result};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the snapshot database and initialize the
    /// schema.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CacheError::snapshot("connect", e))?
            .create_if_missing(true);

        // In-memory databases exist per connection; a pool of one keeps
        // every caller on the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::snapshot("connect", e))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("init_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id  INTEGER PRIMARY KEY,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::snapshot("init_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_cursor (
                id       INTEGER PRIMARY KEY CHECK (id = 0),
                position INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::snapshot("init_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn upsert(&self, products: &[Product]) -> Result<()> {
        for product in products {
            let doc = serde_json::to_string(product).map_err(|e| CacheError::Decode {
                context: format!("encode product {}", product.id),
                message: e.to_string(),
            })?;
            sqlx::query(
                "INSERT INTO products (id, doc) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
            )
            .bind(product.id as i64)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("upsert", e))?;
        }
        Ok(())
    }

    async fn existing_ids(&self, ids: &[u64]) -> Result<HashSet<u64>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT id FROM products WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id as i64);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("existing_ids", e))?;

        Ok(rows.iter().map(|row| row.get::<i64, _>(0) as u64).collect())
    }

    async fn delete_ids(&self, ids: &[u64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM products WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id as i64);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("delete_ids", e))?;

        Ok(result.rows_affected() as usize)
    }

    async fn scan(&self, offset: u64, limit: usize) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT doc FROM products ORDER BY id LIMIT ?1 OFFSET ?2")
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("scan", e))?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: String = row.get(0);
            let product = serde_json::from_str(&doc).map_err(|e| CacheError::Decode {
                context: "decode snapshot document".into(),
                message: e.to_string(),
            })?;
            products.push(product);
        }
        Ok(products)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CacheError::snapshot("count", e))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn load(&self) -> Result<u64> {
        let position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM sync_cursor WHERE id = 0")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CacheError::snapshot("cursor_load", e))?;
        Ok(position.unwrap_or(0) as u64)
    }

    async fn store(&self, cursor: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_cursor (id, position) VALUES (0, ?1) \
             ON CONFLICT(id) DO UPDATE SET position = excluded.position",
        )
        .bind(cursor as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::snapshot("cursor_store", e))?;
        Ok(())
    }
}

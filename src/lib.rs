//! # Catalog Cache
//!
//! An eventually-consistent, queryable replica of a product catalog.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Source of Record                       │
//! │  • Paged product scans for full reimport                   │
//! │  • Append-only change log polled since a cursor            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      (SyncWorker cycles)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Snapshot Store                         │
//! │  • Durable copy of the catalog (SQLite or in-memory)       │
//! │  • Persisted change-feed cursor                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      (generation rebuild)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Replica Cache                          │
//! │  • Immutable generations swapped atomically                │
//! │  • Readers never block and never see partial updates       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Query Engine                           │
//! │  • Filtering, sorting, pagination                          │
//! │  • Faceted statistics with per-dimension filter lifting    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_cache::{
//!     CacheConfig, MemoryCursorStore, MemorySnapshotStore, ProductQuery,
//!     QueryEngine, ReplicaCache, SyncWorker,
//! };
//! # use catalog_cache::CatalogSource;
//! # fn make_source() -> Arc<dyn CatalogSource> { unimplemented!() }
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = Arc::new(ReplicaCache::new());
//!     let worker = SyncWorker::new(
//!         CacheConfig::default(),
//!         make_source(),
//!         Arc::new(MemorySnapshotStore::new()),
//!         Arc::new(MemoryCursorStore::new()),
//!         Arc::clone(&cache),
//!     );
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     tokio::spawn(async move { worker.run(shutdown_rx).await });
//!
//!     let engine = QueryEngine::new(cache);
//!     let page = engine.products(&ProductQuery::default());
//!     println!("{} products", page.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`worker`]: The [`SyncWorker`] running reimport and change cycles
//! - [`cache`]: The generation-swapped [`ReplicaCache`]
//! - [`query`]: The [`QueryEngine`] for filtering, sorting, and facets
//! - [`store`]: Snapshot and cursor persistence (SQLite, in-memory)
//! - [`source`]: The [`CatalogSource`] trait and change-feed reader
//! - [`decoder`]: PHP `serialize()` payload decoding
//! - [`index`]: Serving-index schema and query translation
//! - [`schedule`]: Daily reimport timing math

pub mod cache;
pub mod catalog;
pub mod config;
pub mod decoder;
pub mod error;
pub mod index;
pub mod metrics;
pub mod query;
pub mod schedule;
pub mod source;
pub mod store;
pub mod worker;

pub use cache::{CacheItem, Generation, ReplicaCache, TargetCirculation};
pub use catalog::{
    Attribute, AttributeTerm, Category, ChangeField, ChangeLogEntry, CirculationKind, Image,
    PriceCirculation, Product, ProductAttribute, ProductKind, Variation, VariationAttribute,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use query::{ProductQuery, ProductsStatistic, QueryEngine, SortKey, SortOrder};
pub use source::{CatalogSource, FeedReader, SourceStatistics};
pub use store::{
    CursorStore, MemoryCursorStore, MemorySnapshotStore, SnapshotStore, SqliteStore,
};
pub use worker::SyncWorker;

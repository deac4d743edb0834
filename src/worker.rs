// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Synchronization worker: keeps the replica cache and snapshot store
//! converging on the source of record.
//!
//! Two cycles run on one loop. The change cycle polls the change feed
//! from the persisted cursor and folds field mutations into a new
//! generation. The reimport cycle walks the full source catalog once a
//! day and rebuilds the generation from the snapshot. A cycle guard
//! makes overlapping cycles a no-op rather than a conflict.
//!
//! All feed mutations are idempotent overwrites, so replaying a batch
//! after a crash between apply and cursor persistence converges to the
//! same state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheItem, ReplicaCache};
use crate::catalog::{ChangeField, ChangeLogEntry, ChangeTarget};
use crate::config::CacheConfig;
use crate::decoder;
use crate::error::{CacheError, Result};
use crate::metrics;
use crate::schedule;
use crate::source::{CatalogSource, FeedReader};
use crate::store::{CursorStore, SnapshotStore};

pub struct SyncWorker {
    config: CacheConfig,
    source: Arc<dyn CatalogSource>,
    snapshot: Arc<dyn SnapshotStore>,
    cursor: Arc<dyn CursorStore>,
    cache: Arc<ReplicaCache>,
    feed: FeedReader,
    /// Serializes cycles. `try_lock` failure means a cycle is already
    /// running and the caller skips its turn.
    cycle_guard: Mutex<()>,
}

impl SyncWorker {
    #[must_use]
    pub fn new(
        config: CacheConfig,
        source: Arc<dyn CatalogSource>,
        snapshot: Arc<dyn SnapshotStore>,
        cursor: Arc<dyn CursorStore>,
        cache: Arc<ReplicaCache>,
    ) -> Self {
        let feed = FeedReader::new(Arc::clone(&source));
        Self { config, source, snapshot, cursor, cache, feed, cycle_guard: Mutex::new(()) }
    }

    #[must_use]
    pub fn cache(&self) -> Arc<ReplicaCache> {
        Arc::clone(&self.cache)
    }

    /// Bring the replica to a serving state. An empty snapshot triggers a
    /// full import from the source; otherwise the existing snapshot is
    /// loaded as-is and the change cycle catches it up.
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        let count = self.snapshot.count().await?;
        if count == 0 {
            info!("snapshot empty, running initial import");
            self.full_reimport().await?;
        } else {
            info!(products = count, "loading existing snapshot");
            self.rebuild_generation().await?;
        }
        metrics::record_cycle("bootstrap", "success");
        Ok(())
    }

    /// Walk the source catalog page by page and fill the snapshot, then
    /// rebuild the served generation from it.
    ///
    /// Records already present in the snapshot are skipped, so a rerun
    /// after a partial failure resumes instead of duplicating work.
    #[tracing::instrument(skip(self))]
    pub async fn full_reimport(&self) -> Result<()> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            debug!("another cycle is running, skipping reimport");
            return Ok(());
        };
        let started = Instant::now();

        let result = self.reimport_inner().await;
        match &result {
            Ok(imported) => {
                info!(imported, elapsed = ?started.elapsed(), "full reimport complete");
                metrics::record_cycle("reimport", "success");
            }
            Err(err) => {
                error!(error = %err, "full reimport failed");
                metrics::record_cycle("reimport", "error");
            }
        }
        metrics::record_cycle_duration("reimport", started.elapsed());

        result?;
        self.rebuild_generation().await
    }

    async fn reimport_inner(&self) -> Result<usize> {
        let stats = self.source.get_statistics().await?;
        info!(source_products = stats.count, "starting full reimport");

        let per_page = self.config.scan_page_size;
        let mut imported = 0usize;
        let mut page = 1usize;
        loop {
            let products = self.source.get_page(page, per_page).await?;
            if products.is_empty() {
                break;
            }

            let ids: Vec<u64> = products.iter().map(|p| p.id).collect();
            let present = self.snapshot.existing_ids(&ids).await?;
            let mut seen: HashSet<u64> = HashSet::new();
            let fresh: Vec<_> = products
                .into_iter()
                .filter(|p| !present.contains(&p.id) && seen.insert(p.id))
                .collect();

            if !fresh.is_empty() {
                self.snapshot.upsert(&fresh).await?;
                imported += fresh.len();
            }
            debug!(page, fresh = fresh.len(), "imported page");
            page += 1;
        }
        Ok(imported)
    }

    /// Rebuild the served generation from the snapshot store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_generation(&self) -> Result<()> {
        let limit = self.config.scan_page_size;
        let mut items: Vec<CacheItem> = Vec::new();
        let mut offset = 0u64;
        loop {
            let batch = self.snapshot.scan(offset, limit).await?;
            let got = batch.len();
            items.extend(batch.into_iter().map(CacheItem::new));
            if got < limit {
                break;
            }
            offset += got as u64;
        }

        let size = items.len();
        self.cache.replace(items);
        metrics::set_generation_size(size);
        info!(products = size, "generation rebuilt from snapshot");
        Ok(())
    }

    /// One change cycle: poll the feed from the persisted cursor, fold the
    /// entries into a new generation, persist them to the snapshot, then
    /// advance the cursor. Returns the number of entries consumed.
    ///
    /// The cursor is persisted only after the new generation is visible,
    /// so a crash in between replays the batch on restart.
    #[tracing::instrument(skip(self))]
    pub async fn apply_changes(&self) -> Result<usize> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            debug!("another cycle is running, skipping change poll");
            return Ok(0);
        };
        let started = Instant::now();

        let since = self.cursor.load().await?;
        let entries = self.feed.poll_changes(since, self.config.change_batch_limit).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        // poll_changes returns ascending ids, so the last one is the new cursor
        let next_cursor = entries.last().map(|e| e.id).unwrap_or(since);
        let consumed = entries.len();

        let mut applied = 0usize;
        let mut skipped = 0usize;
        self.cache.mutate(|current| {
            current
                .iter()
                .map(|item| {
                    let relevant: Vec<&ChangeLogEntry> = entries
                        .iter()
                        .filter(|e| {
                            e.target_id == item.product.id
                                || item.product.variations.iter().any(|v| v.id == e.target_id)
                        })
                        .collect();
                    if relevant.is_empty() {
                        return item.clone();
                    }

                    let mut product = item.product.clone();
                    for entry in relevant {
                        let outcome = if entry.target_id == product.id {
                            apply_entry(&mut product, entry)
                        } else {
                            match product.variations.iter_mut().find(|v| v.id == entry.target_id)
                            {
                                Some(variation) => apply_entry(variation, entry),
                                None => Ok(()),
                            }
                        };
                        match outcome {
                            Ok(()) => applied += 1,
                            Err(err) => {
                                warn!(
                                    entry = entry.id,
                                    target = entry.target_id,
                                    field = entry.field.as_key(),
                                    error = %err,
                                    "skipping undecodable change entry"
                                );
                                skipped += 1;
                            }
                        }
                    }
                    CacheItem::new(product)
                })
                .collect()
        });

        // persist the touched products so a later rebuild sees them
        let touched: Vec<u64> = entries.iter().map(|e| e.target_id).collect();
        let generation = self.cache.read();
        let changed: Vec<_> = generation
            .iter()
            .filter(|item| {
                touched.contains(&item.product.id)
                    || item.product.variations.iter().any(|v| touched.contains(&v.id))
            })
            .map(|item| item.product.clone())
            .collect();
        if !changed.is_empty() {
            self.snapshot.upsert(&changed).await?;
        }

        self.cursor.store(next_cursor).await?;

        metrics::record_entries_applied(applied);
        metrics::record_entries_skipped(skipped);
        metrics::set_cursor_position(next_cursor);
        metrics::set_generation_size(self.cache.len());
        metrics::record_cycle("changes", "success");
        metrics::record_cycle_duration("changes", started.elapsed());
        debug!(consumed, applied, skipped, cursor = next_cursor, "change cycle complete");
        Ok(consumed)
    }

    /// Run both cycles until `shutdown` flips to true. Cycle failures are
    /// logged and retried on the next tick, never propagated.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        // reject a bad config before any work starts
        let poll_period = self.config.poll_interval()?;
        let reimport_at = self.config.parsed_reimport_time()?;

        if let Err(err) = self.bootstrap().await {
            error!(error = %err, "bootstrap failed, serving empty replica until recovery");
            metrics::record_cycle("bootstrap", "error");
        }

        let mut poll = tokio::time::interval(poll_period);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let jitter_max = Duration::from_secs(self.config.reimport_jitter_secs);
        let mut next_reimport = tokio::time::Instant::now()
            + schedule::until_next_daily(Utc::now(), reimport_at, schedule::random_jitter(jitter_max));

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(err) = self.apply_changes().await {
                        warn!(error = %err, retryable = err.is_retryable(), "change cycle failed");
                        metrics::record_cycle("changes", "error");
                    }
                }
                _ = tokio::time::sleep_until(next_reimport) => {
                    if let Err(err) = self.full_reimport().await {
                        warn!(error = %err, "scheduled reimport failed");
                    }
                    next_reimport = tokio::time::Instant::now()
                        + schedule::until_next_daily(
                            Utc::now(),
                            reimport_at,
                            schedule::random_jitter(jitter_max),
                        );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("shutdown requested, stopping worker loop");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Fold one change-log entry into a target. Values are idempotent
/// overwrites; an empty payload clears the field.
fn apply_entry<T: ChangeTarget>(target: &mut T, entry: &ChangeLogEntry) -> Result<()> {
    let value = entry.value.trim();
    match &entry.field {
        ChangeField::Stock => {
            if value.is_empty() {
                target.set_stock(None);
            } else {
                let stock = value.parse::<i64>().map_err(|e| CacheError::Decode {
                    context: "_stock".into(),
                    message: format!("'{value}': {e}"),
                })?;
                target.set_stock(Some(stock));
            }
        }
        ChangeField::Price => {
            if value.is_empty() {
                target.set_price(None);
            } else {
                let price = value.parse::<f64>().map_err(|e| CacheError::Decode {
                    context: "_price".into(),
                    message: format!("'{value}': {e}"),
                })?;
                target.set_price(Some((price * 100.0).round() / 100.0));
            }
        }
        ChangeField::PriceCirculations => {
            if value.is_empty() || value == "N;" {
                target.set_circulations(None);
            } else {
                target.set_circulations(Some(decoder::decode_price_circulation(value)?));
            }
        }
        ChangeField::Other(key) => {
            debug!(field = %key, "ignoring untracked change field");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CirculationKind, Product, ProductKind};
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
            stock_quantity: Some(5),
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

    fn entry(id: u64, target: u64, field: ChangeField, value: &str) -> ChangeLogEntry {
        ChangeLogEntry { id, target_id: target, field, value: value.to_string() }
    }

    #[test]
    fn stock_entry_parses_integer() {
        let mut p = product(1);
        apply_entry(&mut p, &entry(1, 1, ChangeField::Stock, "42")).unwrap();
        assert_eq!(p.stock_quantity, Some(42));
    }

    #[test]
    fn empty_payload_clears_field() {
        let mut p = product(1);
        apply_entry(&mut p, &entry(1, 1, ChangeField::Price, "")).unwrap();
        assert_eq!(p.price, None);
        apply_entry(&mut p, &entry(2, 1, ChangeField::Stock, "")).unwrap();
        assert_eq!(p.stock_quantity, None);
    }

    #[test]
    fn price_entry_rounds_to_cents() {
        let mut p = product(1);
        apply_entry(&mut p, &entry(1, 1, ChangeField::Price, "19.999")).unwrap();
        assert_eq!(p.price, Some(20.0));
        apply_entry(&mut p, &entry(2, 1, ChangeField::Price, "12.345")).unwrap();
        assert_eq!(p.price, Some(12.35));
    }

    #[test]
    fn garbage_stock_is_an_error() {
        let mut p = product(1);
        let err = apply_entry(&mut p, &entry(1, 1, ChangeField::Stock, "lots")).unwrap_err();
        assert!(!err.is_retryable());
        // target untouched
        assert_eq!(p.stock_quantity, Some(5));
    }

    #[test]
    fn circulation_entry_decodes_php_payload() {
        let mut p = product(1);
        let blob = r#"a:2:{s:4:"type";s:6:"direct";s:6:"prices";a:1:{i:10;d:9.5;}}"#;
        apply_entry(&mut p, &entry(1, 1, ChangeField::PriceCirculations, blob)).unwrap();
        let circ = p.price_circulations.unwrap();
        assert_eq!(circ.kind, CirculationKind::Direct);
        assert_eq!(circ.tiers.get(&10), Some(&9.5));
    }

    #[test]
    fn php_null_clears_circulations() {
        let mut p = product(1);
        p.price_circulations = Some(crate::catalog::PriceCirculation {
            kind: CirculationKind::Direct,
            tiers: Default::default(),
        });
        apply_entry(&mut p, &entry(1, 1, ChangeField::PriceCirculations, "N;")).unwrap();
        assert!(p.price_circulations.is_none());
    }

    #[test]
    fn untracked_field_is_ignored() {
        let mut p = product(1);
        apply_entry(&mut p, &entry(1, 1, ChangeField::Other("_sale_price".into()), "x")).unwrap();
        assert_eq!(p.price, Some(10.0));
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replica cache: the query-serving generation of catalog data.
//!
//! # Generation discipline
//!
//! The cache holds a single atomically-swappable reference to an immutable
//! generation. Readers capture a local `Arc` and are unaffected by writes in
//! progress; a writer builds the complete new generation off to the side and
//! swaps the shared pointer in one move. No reader ever observes a partially
//! updated collection.
//!
//! Writes are serialized by the synchronization worker's cycle guard, so
//! [`ReplicaCache::mutate`] does not need to defend against concurrent
//! writers; it only has to keep the swap atomic with respect to readers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::catalog::{PriceCirculation, Product};

/// One cached product plus the derived values queries need repeatedly.
#[derive(Debug, Clone)]
pub struct CacheItem {
    pub product: Product,
    /// Creation time as epoch millis, the default sort key.
    pub created_ms: i64,
    /// Lowercased sku/name of the product and all its variations,
    /// newline-joined, for substring search.
    pub search_text: String,
    /// Attribute option slugs grouped by attribute slug.
    pub attribute_options: HashMap<String, BTreeSet<String>>,
}

impl CacheItem {
    #[must_use]
    pub fn new(mut product: Product) -> Self {
        // kind is derived state; re-assert it against the variation list
        product.refresh_kind();
        let created_ms = product.created.timestamp_millis();

        let mut search_text = String::new();
        let mut push_lower = |text: &str| {
            search_text.push_str(&text.to_lowercase());
            search_text.push('\n');
        };
        push_lower(&product.sku);
        push_lower(&product.name);
        for variation in &product.variations {
            push_lower(&variation.sku);
            push_lower(&variation.name);
        }

        let mut attribute_options: HashMap<String, BTreeSet<String>> = HashMap::new();
        for attribute in &product.attributes {
            let options = attribute_options.entry(attribute.slug.clone()).or_default();
            for option in &attribute.options {
                options.insert(option.slug.clone());
            }
        }

        Self { product, created_ms, search_text, attribute_options }
    }

    /// Case-insensitive substring match over sku/name and variation sku/name.
    /// `term` must already be lowercased.
    #[must_use]
    pub fn matches_search(&self, term: &str) -> bool {
        self.search_text.contains(term)
    }

    #[must_use]
    pub fn in_category(&self, slug: &str) -> bool {
        self.product.categories.iter().any(|c| c.slug == slug)
    }

    /// Whether the product carries the attribute dimension at all, and, if
    /// `values` is non-empty, one of the requested option slugs (OR).
    #[must_use]
    pub fn matches_attribute(&self, dimension: &str, values: &[String]) -> bool {
        match self.attribute_options.get(dimension) {
            Some(options) => {
                values.is_empty() || values.iter().any(|v| options.contains(v.as_str()))
            }
            None => false,
        }
    }
}

/// One complete, internally consistent version of the cached catalog.
pub type Generation = Vec<CacheItem>;

/// Per-target stock and tiered pricing, looked up from the current
/// generation for order calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCirculation {
    pub product_id: u64,
    pub variation_id: u64,
    pub stock_quantity: Option<i64>,
    pub price_circulations: Option<PriceCirculation>,
}

/// The query-serving replica of the catalog.
pub struct ReplicaCache {
    current: RwLock<Arc<Generation>>,
}

impl ReplicaCache {
    /// Create an empty cache. It serves empty results until the worker's
    /// bootstrap installs the first generation.
    #[must_use]
    pub fn new() -> Self {
        Self { current: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Capture the current generation. Concurrent and non-blocking among
    /// readers; the returned `Arc` stays valid across any number of swaps.
    #[must_use]
    pub fn read(&self) -> Arc<Generation> {
        Arc::clone(&self.current.read())
    }

    /// Atomically install a new generation.
    pub fn replace(&self, generation: Generation) {
        *self.current.write() = Arc::new(generation);
    }

    /// Build a new generation from the current one and swap it in.
    ///
    /// The builder runs outside the write lock; callers serialize writes
    /// (the worker's cycle guard does this).
    pub fn mutate<F>(&self, build: F)
    where
        F: FnOnce(&Generation) -> Generation,
    {
        let current = self.read();
        let next = Arc::new(build(&current));
        *self.current.write() = next;
    }

    /// Number of products in the current generation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Look up a product by id in the current generation.
    #[must_use]
    pub fn product_by_id(&self, id: u64) -> Option<Product> {
        self.read().iter().find(|item| item.product.id == id).map(|item| item.product.clone())
    }

    /// Look up a product by slug in the current generation.
    #[must_use]
    pub fn product_by_slug(&self, slug: &str) -> Option<Product> {
        self.read().iter().find(|item| item.product.slug == slug).map(|item| item.product.clone())
    }

    /// Resolve stock and tiered pricing for (product_id, variation_id)
    /// pairs. A zero variation_id means the product itself is the target.
    /// Unknown targets yield empty fields rather than being dropped, so the
    /// result aligns with the request.
    #[must_use]
    pub fn circulations(&self, targets: &[(u64, u64)]) -> Vec<TargetCirculation> {
        let generation = self.read();
        targets
            .iter()
            .map(|&(product_id, variation_id)| {
                let item = generation.iter().find(|i| i.product.id == product_id);
                let (stock_quantity, price_circulations) = match item {
                    Some(item) if variation_id != 0 => item
                        .product
                        .variations
                        .iter()
                        .find(|v| v.id == variation_id)
                        .map(|v| (v.stock_quantity, v.price_circulations.clone()))
                        .unwrap_or((None, None)),
                    Some(item) => (item.product.stock_quantity, item.product.price_circulations.clone()),
                    None => (None, None),
                };
                TargetCirculation { product_id, variation_id, stock_quantity, price_circulations }
            })
            .collect()
    }
}

impl Default for ReplicaCache {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query and facet engine over the replica cache.
//!
//! Every request is answered from one captured generation, so listing,
//! counting, and faceting within a single call are mutually consistent.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheItem, ReplicaCache};
use crate::catalog::{Product, ProductAttribute};
use crate::metrics;

/// Minimum search term length; shorter terms match nothing.
const SEARCH_FLOOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Date,
    Price,
    Quantity,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// A catalog query: pagination, sorting, and filters over four
/// dimensions (category, attributes, price range, text search).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub order_by: SortKey,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    /// Attribute slug to requested option slugs. AND across dimensions,
    /// OR within one dimension.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub search: Option<String>,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            order_by: SortKey::default(),
            order: SortOrder::default(),
            min_price: None,
            max_price: None,
            category: None,
            attributes: BTreeMap::new(),
            search: None,
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    100
}

impl ProductQuery {
    fn search_term(&self) -> Option<String> {
        self.search.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
    }

    fn has_price_filter(&self) -> bool {
        self.min_price.is_some() || self.max_price.is_some()
    }
}

/// Aggregate statistics for a filtered view of the catalog.
///
/// Each facet is computed with its own dimension's filter lifted, so a
/// storefront can still offer the sibling choices within a dimension the
/// shopper already narrowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductsStatistic {
    pub products_count: usize,
    pub min_price: f64,
    pub max_price: f64,
    pub attributes: Vec<ProductAttribute>,
}

/// Serves queries from the replica cache.
pub struct QueryEngine {
    cache: Arc<ReplicaCache>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(cache: Arc<ReplicaCache>) -> Self {
        Self { cache }
    }

    /// The page of products matching the query, sorted and sliced.
    #[must_use]
    pub fn products(&self, query: &ProductQuery) -> Vec<Product> {
        let started = Instant::now();
        let generation = self.cache.read();

        if short_circuit_search(query) {
            metrics::record_query("products", started.elapsed());
            return Vec::new();
        }

        let mut matched: Vec<&CacheItem> =
            generation.iter().filter(|item| matches_all(item, query)).collect();
        sort_items(&mut matched, query.order_by, query.order);

        let result = paginate(&matched, query.page, query.per_page)
            .iter()
            .map(|item| item.product.clone())
            .collect();
        metrics::record_query("products", started.elapsed());
        result
    }

    /// Count, price bounds, and attribute facets for the query's filters.
    #[must_use]
    pub fn statistics(&self, query: &ProductQuery) -> ProductsStatistic {
        let started = Instant::now();
        let generation = self.cache.read();

        if short_circuit_search(query) {
            metrics::record_query("statistics", started.elapsed());
            return ProductsStatistic {
                products_count: 0,
                min_price: 0.0,
                max_price: 0.0,
                attributes: Vec::new(),
            };
        }

        // category and search apply to every statistic
        let general: Vec<&CacheItem> =
            generation.iter().filter(|item| matches_general(item, query)).collect();

        let products_count = general
            .iter()
            .filter(|item| matches_attributes(item, query) && matches_price(item, query))
            .count();

        let (min_price, max_price) = price_bounds(
            general.iter().copied().filter(|item| matches_attributes(item, query)),
        );

        let attributes = facet_attributes(
            general.iter().copied().filter(|item| matches_price(item, query)),
        );

        metrics::record_query("statistics", started.elapsed());
        ProductsStatistic { products_count, min_price, max_price, attributes }
    }
}

/// A non-empty search term below the floor matches nothing at all.
fn short_circuit_search(query: &ProductQuery) -> bool {
    matches!(query.search_term(), Some(term) if term.chars().count() < SEARCH_FLOOR)
}

fn matches_general(item: &CacheItem, query: &ProductQuery) -> bool {
    if let Some(category) = &query.category {
        if !item.in_category(category) {
            return false;
        }
    }
    if let Some(term) = query.search_term() {
        if !item.matches_search(&term) {
            return false;
        }
    }
    true
}

fn matches_attributes(item: &CacheItem, query: &ProductQuery) -> bool {
    query
        .attributes
        .iter()
        .all(|(dimension, values)| item.matches_attribute(dimension, values))
}

/// min is inclusive, max is exclusive. A product without a price fails
/// any active price filter.
fn matches_price(item: &CacheItem, query: &ProductQuery) -> bool {
    if !query.has_price_filter() {
        return true;
    }
    let Some(price) = item.product.price else {
        return false;
    };
    if let Some(min) = query.min_price {
        if price < min {
            return false;
        }
    }
    if let Some(max) = query.max_price {
        if price >= max {
            return false;
        }
    }
    true
}

fn matches_all(item: &CacheItem, query: &ProductQuery) -> bool {
    matches_general(item, query) && matches_attributes(item, query) && matches_price(item, query)
}

/// Price bounds scan product and variation prices alike. An empty input
/// yields (0, 0).
fn price_bounds<'a>(items: impl Iterator<Item = &'a CacheItem>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;
    let mut observe = |price: Option<f64>| {
        if let Some(p) = price {
            seen = true;
            min = min.min(p);
            max = max.max(p);
        }
    };
    for item in items {
        observe(item.product.price);
        for variation in &item.product.variations {
            observe(variation.price);
        }
    }
    if seen { (min, max) } else { (0.0, 0.0) }
}

/// Merge attribute facets across the matching items. Attributes merge by
/// id; option lists merge by slug, first occurrence wins.
fn facet_attributes<'a>(items: impl Iterator<Item = &'a CacheItem>) -> Vec<ProductAttribute> {
    let mut merged: BTreeMap<u64, ProductAttribute> = BTreeMap::new();
    for item in items {
        for attribute in &item.product.attributes {
            match merged.get_mut(&attribute.id) {
                Some(existing) => {
                    for option in &attribute.options {
                        if !existing.options.iter().any(|o| o.slug == option.slug) {
                            existing.options.push(option.clone());
                        }
                    }
                }
                None => {
                    let mut entry = attribute.clone();
                    entry.dedup_options();
                    merged.insert(attribute.id, entry);
                }
            }
        }
    }
    merged.into_values().collect()
}

fn sort_items(items: &mut [&CacheItem], key: SortKey, order: SortOrder) {
    let compare = |a: &&CacheItem, b: &&CacheItem| -> Ordering {
        match key {
            SortKey::Date => a.created_ms.cmp(&b.created_ms),
            SortKey::Price => {
                let pa = a.product.price.unwrap_or(0.0);
                let pb = b.product.price.unwrap_or(0.0);
                pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
            }
            SortKey::Quantity => {
                let qa = a.product.stock_quantity.unwrap_or(0);
                let qb = b.product.stock_quantity.unwrap_or(0);
                qa.cmp(&qb)
            }
            SortKey::Name => a.product.name.to_lowercase().cmp(&b.product.name.to_lowercase()),
        }
    };
    items.sort_by(compare);
    if order == SortOrder::Desc {
        items.reverse();
    }
}

fn paginate<'a>(items: &'a [&'a CacheItem], page: u32, per_page: u32) -> &'a [&'a CacheItem] {
    let page = page.max(1) as usize;
    let per_page = per_page as usize;
    let start = per_page.saturating_mul(page - 1);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(per_page).min(items.len());
    &items[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeTerm, ProductKind};
    use chrono::{TimeZone, Utc};

    fn product(id: u64, name: &str, price: Option<f64>) -> Product {
        Product {
            id,
            sku: format!("SKU-{id}"),
            name: name.to_string(),
            slug: format!("p-{id}"),
            description: String::new(),
            kind: ProductKind::Simple,
            price,
            stock_quantity: Some(id as i64),
            created: Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap(),
            modified: Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap(),
            price_circulations: None,
            categories: vec![],
            images: vec![],
            attributes: vec![],
            default_attributes: vec![],
            variations: vec![],
        }
    }

    fn with_attribute(mut p: Product, slug: &str, option: &str) -> Product {
        p.attributes.push(ProductAttribute {
            id: match slug {
                "color" => 1,
                _ => 2,
            },
            name: slug.to_string(),
            slug: slug.to_string(),
            visible: true,
            variation: false,
            options: vec![AttributeTerm {
                id: 0,
                name: option.to_string(),
                slug: option.to_string(),
            }],
        });
        p
    }

    fn engine(products: Vec<Product>) -> QueryEngine {
        let cache = Arc::new(ReplicaCache::new());
        cache.replace(products.into_iter().map(CacheItem::new).collect());
        QueryEngine::new(cache)
    }

    #[test]
    fn price_filter_min_inclusive_max_exclusive() {
        let engine = engine(vec![
            product(1, "A", Some(10.0)),
            product(2, "B", Some(20.0)),
            product(3, "C", None),
        ]);
        let query = ProductQuery {
            min_price: Some(10.0),
            max_price: Some(20.0),
            order: SortOrder::Asc,
            ..Default::default()
        };
        let result = engine.products(&query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 1);
    }

    #[test]
    fn attributes_and_across_dimensions_or_within() {
        let engine = engine(vec![
            with_attribute(with_attribute(product(1, "A", Some(1.0)), "color", "red"), "size", "m"),
            with_attribute(product(2, "B", Some(1.0)), "color", "blue"),
        ]);
        let mut query = ProductQuery::default();
        query.attributes.insert("color".into(), vec!["red".into(), "blue".into()]);
        assert_eq!(engine.products(&query).len(), 2);

        query.attributes.insert("size".into(), vec!["m".into()]);
        let result = engine.products(&query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 1);
    }

    #[test]
    fn short_search_matches_nothing() {
        let engine = engine(vec![product(1, "Ab", Some(1.0))]);
        let query = ProductQuery { search: Some("a".into()), ..Default::default() };
        assert!(engine.products(&query).is_empty());
        let stats = engine.statistics(&query);
        assert_eq!(stats.products_count, 0);
        assert_eq!(stats.min_price, 0.0);
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let engine = engine(vec![
            product(1, "banana", Some(1.0)),
            product(2, "Apple", Some(1.0)),
            product(3, "cherry", Some(1.0)),
        ]);
        let query = ProductQuery {
            order_by: SortKey::Name,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let names: Vec<String> = engine.products(&query).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn default_sort_is_date_descending() {
        let engine = engine(vec![
            product(1, "Oldest", Some(1.0)),
            product(3, "Newest", Some(1.0)),
            product(2, "Middle", Some(1.0)),
        ]);
        let ids: Vec<u64> =
            engine.products(&ProductQuery::default()).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn pagination_slices_and_overruns_empty() {
        let engine = engine(vec![
            product(1, "A", Some(1.0)),
            product(2, "B", Some(1.0)),
            product(3, "C", Some(1.0)),
        ]);
        let query = ProductQuery {
            page: 2,
            per_page: 1,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let result = engine.products(&query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 2);

        let past_end = ProductQuery { page: 10, per_page: 1, ..Default::default() };
        assert!(engine.products(&past_end).is_empty());
    }

    #[test]
    fn facet_lifts_own_dimension_only() {
        // two products, one red at 10, one blue at 20
        let engine = engine(vec![
            with_attribute(product(1, "Red", Some(10.0)), "color", "red"),
            with_attribute(product(2, "Blue", Some(20.0)), "color", "blue"),
        ]);

        let mut query = ProductQuery::default();
        query.attributes.insert("color".into(), vec!["red".into()]);

        let stats = engine.statistics(&query);
        // count honors the color filter
        assert_eq!(stats.products_count, 1);
        // price bounds honor the color filter too
        assert_eq!(stats.min_price, 10.0);
        assert_eq!(stats.max_price, 10.0);
        // color facet lifts its own filter and still offers blue
        let color = stats.attributes.iter().find(|a| a.slug == "color").unwrap();
        let mut options: Vec<&str> = color.options.iter().map(|o| o.slug.as_str()).collect();
        options.sort_unstable();
        assert_eq!(options, vec!["blue", "red"]);
    }

    #[test]
    fn facet_price_filter_still_applies_to_attributes() {
        let engine = engine(vec![
            with_attribute(product(1, "Red", Some(10.0)), "color", "red"),
            with_attribute(product(2, "Blue", Some(20.0)), "color", "blue"),
        ]);
        let query = ProductQuery { max_price: Some(15.0), ..Default::default() };
        let stats = engine.statistics(&query);
        let color = stats.attributes.iter().find(|a| a.slug == "color").unwrap();
        let options: Vec<&str> = color.options.iter().map(|o| o.slug.as_str()).collect();
        assert_eq!(options, vec!["red"]);
    }

    #[test]
    fn price_bounds_include_variation_prices() {
        let mut p = product(1, "Varied", Some(10.0));
        p.variations.push(crate::catalog::Variation {
            id: 2,
            parent_id: 1,
            sku: "V".into(),
            name: "V".into(),
            slug: "v".into(),
            description: String::new(),
            price: Some(7.5),
            stock_quantity: None,
            created: p.created,
            modified: p.modified,
            price_circulations: None,
            images: vec![],
            attributes: vec![],
        });
        let engine = engine(vec![p]);
        let stats = engine.statistics(&ProductQuery::default());
        assert_eq!(stats.min_price, 7.5);
        assert_eq!(stats.max_price, 10.0);
    }
}

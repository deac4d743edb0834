// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end query and facet behavior over a hand-built generation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use catalog_cache::{
    AttributeTerm, CacheItem, Category, Product, ProductAttribute, ProductKind, ProductQuery,
    QueryEngine, ReplicaCache, SortKey, SortOrder,
};

fn product(id: u64, name: &str, price: Option<f64>) -> Product {
    Product {
        id,
        sku: format!("SKU-{id}"),
        name: name.to_string(),
        slug: format!("p-{id}"),
        description: String::new(),
        kind: ProductKind::Simple,
        price,
        stock_quantity: Some(id as i64 * 10),
        created: Utc.with_ymd_and_hms(2024, 3, id as u32, 12, 0, 0).unwrap(),
        modified: Utc.with_ymd_and_hms(2024, 3, id as u32, 12, 0, 0).unwrap(),
        price_circulations: None,
        categories: vec![],
        images: vec![],
        attributes: vec![],
        default_attributes: vec![],
        variations: vec![],
    }
}

fn with_color(mut p: Product, option: &str) -> Product {
    p.attributes.push(ProductAttribute {
        id: 1,
        name: "Color".into(),
        slug: "color".into(),
        visible: true,
        variation: false,
        options: vec![AttributeTerm { id: 0, name: option.to_string(), slug: option.to_string() }],
    });
    p
}

fn in_category(mut p: Product, slug: &str) -> Product {
    p.categories.push(Category {
        id: 0,
        parent_id: 0,
        name: slug.to_string(),
        slug: slug.to_string(),
        description: String::new(),
        count: 0,
    });
    p
}

fn engine(products: Vec<Product>) -> QueryEngine {
    let cache = Arc::new(ReplicaCache::new());
    cache.replace(products.into_iter().map(CacheItem::new).collect());
    QueryEngine::new(cache)
}

#[test]
fn faceting_lifts_only_the_facets_own_dimension() {
    // one red product at 10, one blue product at 20
    let engine = engine(vec![
        with_color(product(1, "Red Mug", Some(10.0)), "red"),
        with_color(product(2, "Blue Mug", Some(20.0)), "blue"),
    ]);

    let mut query = ProductQuery::default();
    query.attributes.insert("color".into(), vec!["red".into()]);
    let stats = engine.statistics(&query);

    // count and price bounds honor the color filter
    assert_eq!(stats.products_count, 1);
    assert_eq!(stats.min_price, 10.0);
    assert_eq!(stats.max_price, 10.0);

    // the color facet lifts its own filter: blue is still offered
    let color = stats.attributes.iter().find(|a| a.slug == "color").unwrap();
    let mut options: Vec<&str> = color.options.iter().map(|o| o.slug.as_str()).collect();
    options.sort_unstable();
    assert_eq!(options, vec!["blue", "red"]);
}

#[test]
fn listing_and_statistics_agree_on_the_filtered_set() {
    let engine = engine(vec![
        in_category(product(1, "A", Some(5.0)), "mugs"),
        in_category(product(2, "B", Some(15.0)), "mugs"),
        product(3, "C", Some(25.0)),
    ]);
    let query = ProductQuery { category: Some("mugs".into()), ..Default::default() };

    let listed = engine.products(&query);
    let stats = engine.statistics(&query);
    assert_eq!(listed.len(), stats.products_count);
    assert_eq!(stats.min_price, 5.0);
    assert_eq!(stats.max_price, 15.0);
}

#[test]
fn single_character_search_matches_nothing() {
    let engine = engine(vec![product(1, "Mug", Some(5.0))]);

    let query = ProductQuery { search: Some("m".into()), ..Default::default() };
    assert!(engine.products(&query).is_empty());
    assert_eq!(engine.statistics(&query).products_count, 0);

    // at the floor the search works again
    let query = ProductQuery { search: Some("mu".into()), ..Default::default() };
    assert_eq!(engine.products(&query).len(), 1);
}

#[test]
fn search_is_case_insensitive_and_covers_sku() {
    let engine = engine(vec![product(7, "Teapot", Some(5.0))]);
    let query = ProductQuery { search: Some("sku-7".into()), ..Default::default() };
    assert_eq!(engine.products(&query).len(), 1);
    let query = ProductQuery { search: Some("TEA".into()), ..Default::default() };
    assert_eq!(engine.products(&query).len(), 1);
}

#[test]
fn pagination_boundaries() {
    let engine = engine(vec![
        product(1, "A", Some(1.0)),
        product(2, "B", Some(1.0)),
        product(3, "C", Some(1.0)),
    ]);
    let base = ProductQuery { per_page: 1, order: SortOrder::Asc, ..Default::default() };

    let page2 = engine.products(&ProductQuery { page: 2, ..base.clone() });
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].id, 2);

    let page3 = engine.products(&ProductQuery { page: 3, ..base.clone() });
    assert_eq!(page3[0].id, 3);

    // a page past the end is empty, not an error
    assert!(engine.products(&ProductQuery { page: 10, ..base }).is_empty());
}

#[test]
fn name_sort_ignores_case_both_directions() {
    let engine = engine(vec![
        product(1, "zebra", Some(1.0)),
        product(2, "Apple", Some(1.0)),
        product(3, "mango", Some(1.0)),
    ]);

    let asc = ProductQuery {
        order_by: SortKey::Name,
        order: SortOrder::Asc,
        ..Default::default()
    };
    let names: Vec<String> = engine.products(&asc).into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Apple", "mango", "zebra"]);

    let desc = ProductQuery { order_by: SortKey::Name, ..Default::default() };
    let names: Vec<String> = engine.products(&desc).into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["zebra", "mango", "Apple"]);
}

#[test]
fn missing_prices_sort_as_zero() {
    let engine = engine(vec![
        product(1, "Priced", Some(5.0)),
        product(2, "Unpriced", None),
    ]);
    let query = ProductQuery {
        order_by: SortKey::Price,
        order: SortOrder::Asc,
        ..Default::default()
    };
    let ids: Vec<u64> = engine.products(&query).into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[test]
fn combined_filters_intersect() {
    let engine = engine(vec![
        with_color(in_category(product(1, "Red Mug", Some(10.0)), "mugs"), "red"),
        with_color(in_category(product(2, "Blue Mug", Some(30.0)), "mugs"), "blue"),
        with_color(product(3, "Red Plate", Some(10.0)), "red"),
    ]);
    let mut query = ProductQuery {
        category: Some("mugs".into()),
        min_price: Some(5.0),
        max_price: Some(20.0),
        ..Default::default()
    };
    query.attributes = BTreeMap::from([("color".to_string(), vec!["red".to_string()])]);

    let result = engine.products(&query);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].id, 1);
}

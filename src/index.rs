// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Serving-index contract: schema, document flattening, and query
//! translation for a RediSearch-compatible secondary index.
//!
//! The replica cache answers queries locally; this module defines what an
//! external index deployment must look like so both paths agree on field
//! names, tokenization, and escaping.

use serde::Serialize;

use crate::catalog::Product;
use crate::query::{ProductQuery, SortKey, SortOrder};

pub const INDEX_NAME: &str = "idx:products";
pub const DOC_PREFIX: &str = "product:";

/// Characters RediSearch treats as syntax inside tag and text tokens.
const RESERVED: &[char] = &[
    '-', '@', '|', '(', ')', '{', '}', '[', ']', '"', '~', '*', '^', '$', ':', ';', ',', ' ',
];

#[must_use]
pub fn doc_key(id: u64) -> String {
    format!("{DOC_PREFIX}{id}")
}

/// Escape every reserved character in a tag or text token. Unescaped
/// tokens silently change query meaning, so every user-supplied value
/// must pass through here before interpolation.
#[must_use]
pub fn escape_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFieldKind {
    Numeric,
    Tag,
    Text,
}

/// One field of the index schema: a JSONPath into the stored document and
/// the name queries address it by.
#[derive(Debug, Clone)]
pub struct IndexField {
    pub path: &'static str,
    pub name: &'static str,
    pub kind: IndexFieldKind,
    pub sortable: bool,
}

/// The index schema the external deployment must create.
#[must_use]
pub fn index_schema() -> Vec<IndexField> {
    use IndexFieldKind::{Numeric, Tag, Text};
    vec![
        IndexField { path: "$.id", name: "id", kind: Numeric, sortable: true },
        IndexField { path: "$.slug", name: "slug", kind: Tag, sortable: false },
        IndexField { path: "$.sku", name: "sku", kind: Text, sortable: false },
        IndexField { path: "$.name", name: "name", kind: Text, sortable: true },
        IndexField {
            path: "$.stock_quantity",
            name: "stock_quantity",
            kind: Numeric,
            sortable: true,
        },
        IndexField { path: "$.price", name: "price", kind: Numeric, sortable: true },
        IndexField { path: "$.categories[*].slug", name: "categories", kind: Tag, sortable: false },
        IndexField { path: "$.attributes", name: "attributes", kind: Tag, sortable: false },
        IndexField {
            path: "$.attribute_options",
            name: "attribute_options",
            kind: Tag,
            sortable: false,
        },
    ]
}

/// A product flattened into the shape the index stores.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    pub id: u64,
    pub slug: String,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i64,
    pub price: f64,
    pub categories: Vec<String>,
    pub attributes: Vec<String>,
    pub attribute_options: Vec<String>,
}

impl From<&Product> for IndexDocument {
    fn from(product: &Product) -> Self {
        let mut attribute_options: Vec<String> = product
            .attributes
            .iter()
            .flat_map(|a| a.options.iter().map(|o| o.slug.clone()))
            .collect();
        attribute_options.sort_unstable();
        attribute_options.dedup();
        Self {
            id: product.id,
            slug: product.slug.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            stock_quantity: product.stock_quantity.unwrap_or(0),
            price: product.price.unwrap_or(0.0),
            categories: product.categories.iter().map(|c| c.slug.clone()).collect(),
            attributes: product.attributes.iter().map(|a| a.slug.clone()).collect(),
            attribute_options,
        }
    }
}

/// Translate a query's filters into the index query language. No filters
/// yields the match-all query `*`.
#[must_use]
pub fn build_query(query: &ProductQuery) -> String {
    let mut clauses: Vec<String> = Vec::new();

    if let Some(category) = &query.category {
        clauses.push(format!("@categories:{{{}}}", escape_token(category)));
    }

    if query.min_price.is_some() || query.max_price.is_some() {
        let min = query.min_price.map_or_else(|| "-inf".to_string(), |v| v.to_string());
        let max = query.max_price.map_or_else(|| "+inf".to_string(), |v| v.to_string());
        clauses.push(format!("@price:[{min} {max}]"));
    }

    for (dimension, values) in &query.attributes {
        let dimension = escape_token(dimension);
        if values.is_empty() {
            clauses.push(format!("@attributes:{{{dimension}}}"));
        } else {
            let options: Vec<String> = values.iter().map(|v| escape_token(v)).collect();
            clauses.push(format!(
                "(@attributes:{{{dimension}}} @attribute_options:{{{}}})",
                options.join("|")
            ));
        }
    }

    if let Some(term) = query.search.as_deref().map(str::trim) {
        if term.chars().count() >= 2 {
            let term = escape_token(term);
            clauses.push(format!("(@sku:*{term}*|@name:*{term}*)"));
        }
    }

    if clauses.is_empty() {
        "*".to_string()
    } else {
        clauses.join(" ")
    }
}

/// The sortable field name for a sort key, plus direction.
#[must_use]
pub fn build_sort(query: &ProductQuery) -> (&'static str, &'static str) {
    let field = match query.order_by {
        SortKey::Date => "id",
        SortKey::Price => "price",
        SortKey::Quantity => "stock_quantity",
        SortKey::Name => "name",
    };
    let direction = match query.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    (field, direction)
}

/// LIMIT offset and count for the query's page.
#[must_use]
pub fn build_paging(query: &ProductQuery) -> (u64, u64) {
    let page = u64::from(query.page.max(1));
    let per_page = u64::from(query.per_page);
    (per_page * (page - 1), per_page)
}

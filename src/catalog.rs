// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Catalog data model.
//!
//! The document shapes that flow from the relational source through the
//! snapshot store into the replica cache. Products are created wholesale by a
//! full reimport and then mutated in place (price, stock, tiered pricing
//! only) by the incremental change feed; everything else is immutable until
//! the next reimport replaces the generation.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decoder::{self, PhpValue};
use crate::error::{CacheError, Result};

/// Product kind, derived from the variation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Simple,
    Variable,
}

/// A catalog product document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub sku: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    /// Nullable: some products carry price only on their variations.
    pub price: Option<f64>,
    pub stock_quantity: Option<i64>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_circulations: Option<PriceCirculation>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub default_attributes: Vec<VariationAttribute>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

impl Product {
    /// Kind implied by the variation list: `Variable` iff non-empty.
    #[must_use]
    pub fn implied_kind(variations: &[Variation]) -> ProductKind {
        if variations.is_empty() {
            ProductKind::Simple
        } else {
            ProductKind::Variable
        }
    }

    /// Re-derive `kind` from the current variation list.
    pub fn refresh_kind(&mut self) {
        self.kind = Self::implied_kind(&self.variations);
    }
}

/// A product variation. References its parent product by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: u64,
    pub parent_id: u64,
    pub sku: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub stock_quantity: Option<i64>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_circulations: Option<PriceCirculation>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub attributes: Vec<VariationAttribute>,
}

/// Global taxonomy attribute (e.g. "color", "size").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

/// One option of a global attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTerm {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

/// A global attribute scoped to one product, with its option list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub visible: bool,
    pub variation: bool,
    pub options: Vec<AttributeTerm>,
}

impl ProductAttribute {
    /// Deduplicate the option list by slug, keeping first occurrence order.
    pub fn dedup_options(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.options.retain(|o| seen.insert(o.slug.clone()));
    }
}

/// Attribute selection on a variation (or a product's defaults).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationAttribute {
    pub id: u64,
    pub name: String,
    pub option: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub parent_id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub name: String,
    pub src: String,
}

/// How circulation tiers are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CirculationKind {
    /// Tier values are percentages relative to the base price.
    Relative,
    /// Tier values are absolute per-unit prices.
    Direct,
}

/// Tiered, quantity-dependent pricing attached to a product or variation.
///
/// `tiers` maps a quantity threshold to a value whose meaning depends on
/// `kind`. BTreeMap keeps thresholds ordered for deterministic serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCirculation {
    pub kind: CirculationKind,
    pub tiers: BTreeMap<u64, f64>,
}

/// Tracked field of a change-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeField {
    Stock,
    Price,
    PriceCirculations,
    /// Anything the worker does not track; skipped with a log line.
    Other(String),
}

impl ChangeField {
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "_stock" => ChangeField::Stock,
            "_price" => ChangeField::Price,
            "_price_circulations" => ChangeField::PriceCirculations,
            other => ChangeField::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_key(&self) -> &str {
        match self {
            ChangeField::Stock => "_stock",
            ChangeField::Price => "_price",
            ChangeField::PriceCirculations => "_price_circulations",
            ChangeField::Other(key) => key,
        }
    }
}

/// One row of the source's append-only change log.
///
/// `id` is strictly increasing across the feed; `target_id` is the owning
/// product or variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: u64,
    pub target_id: u64,
    pub field: ChangeField,
    pub value: String,
}

/// A mutation target shared by products and variations: the three fields
/// the incremental feed is allowed to overwrite.
pub trait ChangeTarget {
    fn set_price(&mut self, price: Option<f64>);
    fn set_stock(&mut self, stock: Option<i64>);
    fn set_circulations(&mut self, circulations: Option<PriceCirculation>);
}

impl ChangeTarget for Product {
    fn set_price(&mut self, price: Option<f64>) {
        self.price = price;
    }
    fn set_stock(&mut self, stock: Option<i64>) {
        self.stock_quantity = stock;
    }
    fn set_circulations(&mut self, circulations: Option<PriceCirculation>) {
        self.price_circulations = circulations;
    }
}

impl ChangeTarget for Variation {
    fn set_price(&mut self, price: Option<f64>) {
        self.price = price;
    }
    fn set_stock(&mut self, stock: Option<i64>) {
        self.stock_quantity = stock;
    }
    fn set_circulations(&mut self, circulations: Option<PriceCirculation>) {
        self.price_circulations = circulations;
    }
}

/// Raw attribute metadata as decoded from the source's serialized blob,
/// before resolution against the global taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProductAttribute {
    /// Taxonomy name as stored by the source, e.g. `pa_color`.
    pub name: String,
    pub visible: bool,
    pub variation: bool,
}

impl RawProductAttribute {
    /// Decode a serialized `_product_attributes` blob into raw entries.
    pub fn decode_blob(blob: &str) -> Result<Vec<RawProductAttribute>> {
        let value = decoder::decode(blob)?;
        let entries = value.as_array().ok_or_else(|| CacheError::Decode {
            context: "product_attributes".into(),
            message: "top-level value is not an array".into(),
        })?;

        let mut raw = Vec::with_capacity(entries.len());
        for (_, entry) in entries {
            let name = entry
                .get("name")
                .and_then(PhpValue::as_str)
                .ok_or_else(|| CacheError::Decode {
                    context: "product_attributes".into(),
                    message: "attribute entry is missing 'name'".into(),
                })?;
            raw.push(RawProductAttribute {
                name: name.to_string(),
                visible: entry.get("is_visible").and_then(PhpValue::as_bool).unwrap_or(false),
                variation: entry.get("is_variation").and_then(PhpValue::as_bool).unwrap_or(false),
            });
        }
        Ok(raw)
    }
}

/// Resolve a product's serialized attribute blob against the global taxonomy.
///
/// A raw entry of taxonomy name `pa_<slug>` must match a global attribute by
/// `<slug>`; a miss is fatal for this record only ([`CacheError::MissingAttribute`]),
/// and callers continue with the remaining records of the page. Option lists
/// come from `terms_by_attribute` (keyed by the source taxonomy name) and are
/// deduplicated by slug.
pub fn materialize_attributes(
    product_id: u64,
    blob: &str,
    taxonomy: &[Attribute],
    terms_by_attribute: &HashMap<String, Vec<AttributeTerm>>,
) -> Result<Vec<ProductAttribute>> {
    let raw = RawProductAttribute::decode_blob(blob)?;
    let mut resolved = Vec::with_capacity(raw.len());

    for entry in raw {
        let global = taxonomy
            .iter()
            .find(|a| format!("pa_{}", a.slug) == entry.name)
            .ok_or_else(|| CacheError::MissingAttribute {
                product_id,
                slug: entry.name.clone(),
            })?;

        let mut attribute = ProductAttribute {
            id: global.id,
            name: global.name.clone(),
            slug: global.slug.clone(),
            visible: entry.visible,
            variation: entry.variation,
            options: terms_by_attribute.get(&entry.name).cloned().unwrap_or_default(),
        };
        attribute.dedup_options();
        resolved.push(attribute);
    }

    Ok(resolved)
}

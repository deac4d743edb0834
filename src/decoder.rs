// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Legacy serialized-blob decoder.
//!
//! The relational source embeds PHP `serialize()` output in its metadata
//! fields (product attribute metadata, tiered-price rules). This module is
//! the only place that grammar is parsed; callers receive typed values and
//! never touch the wire text.
//!
//! # Grammar
//!
//! ```text
//! value   := null | bool | int | float | string | array
//! null    := "N;"
//! bool    := "b:" ("0"|"1") ";"
//! int     := "i:" digits ";"
//! float   := "d:" number ";"
//! string  := "s:" len ":" '"' bytes '"' ";"
//! array   := "a:" count ":{" (value value)* "}"
//! ```
//!
//! String lengths count bytes, not characters. Array entries are key/value
//! pairs; keys are integers or strings. Malformed input is an error, never a
//! panic (the property suite fuzzes this).

use std::collections::BTreeMap;

use crate::catalog::{CirculationKind, PriceCirculation};
use crate::error::{CacheError, Result};

/// A decoded PHP value.
#[derive(Debug, Clone, PartialEq)]
pub enum PhpValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Ordered key/value pairs, as written by the source.
    Array(Vec<(PhpKey, PhpValue)>),
}

/// An array key: PHP arrays mix integer and string keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhpKey {
    Int(i64),
    String(String),
}

impl PhpValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PhpValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness the way the source writes flags: `b:1`, `i:1` or `"1"`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PhpValue::Bool(b) => Some(*b),
            PhpValue::Int(i) => Some(*i != 0),
            PhpValue::String(s) => Some(s == "1"),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PhpValue::Int(i) => Some(*i),
            PhpValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric coercion: floats, ints and numeric strings all qualify.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PhpValue::Float(f) => Some(*f),
            PhpValue::Int(i) => Some(*i as f64),
            PhpValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[(PhpKey, PhpValue)]> {
        match self {
            PhpValue::Array(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up an array entry by string key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PhpValue> {
        self.as_array()?.iter().find_map(|(k, v)| match k {
            PhpKey::String(s) if s == key => Some(v),
            _ => None,
        })
    }
}

/// Decode one serialized value. Trailing bytes after the value are an error.
pub fn decode(input: &str) -> Result<PhpValue> {
    let mut parser = Parser { bytes: input.as_bytes(), pos: 0 };
    let value = parser.value()?;
    if parser.pos != parser.bytes.len() {
        return Err(parser.error("trailing bytes after value"));
    }
    Ok(value)
}

/// Decode a serialized tiered-pricing blob.
///
/// Expected shape: an array with a `type` entry (`"relative"` or `"direct"`)
/// and a `prices` entry mapping quantity thresholds to values.
pub fn decode_price_circulation(input: &str) -> Result<PriceCirculation> {
    let value = decode(input)?;

    let kind = match value.get("type").and_then(PhpValue::as_str) {
        Some("relative") => CirculationKind::Relative,
        Some("direct") => CirculationKind::Direct,
        Some(other) => {
            return Err(CacheError::Decode {
                context: "price_circulations".into(),
                message: format!("unknown circulation type '{other}'"),
            })
        }
        None => {
            return Err(CacheError::Decode {
                context: "price_circulations".into(),
                message: "missing 'type' entry".into(),
            })
        }
    };

    let prices = value
        .get("prices")
        .and_then(PhpValue::as_array)
        .ok_or_else(|| CacheError::Decode {
            context: "price_circulations".into(),
            message: "missing 'prices' array".into(),
        })?;

    let mut tiers = BTreeMap::new();
    for (key, tier_value) in prices {
        let quantity = match key {
            PhpKey::Int(i) if *i >= 0 => *i as u64,
            PhpKey::String(s) => s.trim().parse().map_err(|_| CacheError::Decode {
                context: "price_circulations".into(),
                message: format!("non-numeric quantity threshold '{s}'"),
            })?,
            PhpKey::Int(i) => {
                return Err(CacheError::Decode {
                    context: "price_circulations".into(),
                    message: format!("negative quantity threshold {i}"),
                })
            }
        };
        let value = tier_value.as_f64().ok_or_else(|| CacheError::Decode {
            context: "price_circulations".into(),
            message: format!("non-numeric tier value for quantity {quantity}"),
        })?;
        tiers.insert(quantity, value);
    }

    Ok(PriceCirculation { kind, tiers })
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> CacheError {
        CacheError::Decode {
            context: format!("serialized blob at byte {}", self.pos),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(format!("expected '{}', found '{}'", byte as char, b as char))),
            None => Err(self.error(format!("expected '{}', found end of input", byte as char))),
        }
    }

    /// Read bytes up to (not including) the delimiter, consuming it.
    fn until(&mut self, delim: u8) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == delim {
                let slice = &self.bytes[start..self.pos];
                self.pos += 1;
                return std::str::from_utf8(slice).map_err(|_| self.error("non-UTF-8 token"));
            }
            self.pos += 1;
        }
        Err(self.error(format!("unterminated token, expected '{}'", delim as char)))
    }

    fn value(&mut self) -> Result<PhpValue> {
        match self.peek() {
            Some(b'N') => {
                self.pos += 1;
                self.expect(b';')?;
                Ok(PhpValue::Null)
            }
            Some(b'b') => {
                self.pos += 1;
                self.expect(b':')?;
                let token = self.until(b';')?;
                match token {
                    "0" => Ok(PhpValue::Bool(false)),
                    "1" => Ok(PhpValue::Bool(true)),
                    other => Err(self.error(format!("invalid bool '{other}'"))),
                }
            }
            Some(b'i') => {
                self.pos += 1;
                self.expect(b':')?;
                let token = self.until(b';')?;
                token
                    .parse()
                    .map(PhpValue::Int)
                    .map_err(|_| self.error(format!("invalid integer '{token}'")))
            }
            Some(b'd') => {
                self.pos += 1;
                self.expect(b':')?;
                let token = self.until(b';')?;
                token
                    .parse()
                    .map(PhpValue::Float)
                    .map_err(|_| self.error(format!("invalid float '{token}'")))
            }
            Some(b's') => {
                self.pos += 1;
                self.expect(b':')?;
                let len = self.length()?;
                self.expect(b':')?;
                self.expect(b'"')?;
                let end = self.pos.checked_add(len).ok_or_else(|| self.error("string length overflow"))?;
                if end > self.bytes.len() {
                    return Err(self.error("string length exceeds input"));
                }
                let raw = &self.bytes[self.pos..end];
                let text = std::str::from_utf8(raw).map_err(|_| self.error("non-UTF-8 string"))?;
                self.pos = end;
                self.expect(b'"')?;
                self.expect(b';')?;
                Ok(PhpValue::String(text.to_string()))
            }
            Some(b'a') => {
                self.pos += 1;
                self.expect(b':')?;
                let count = self.length()?;
                self.expect(b':')?;
                self.expect(b'{')?;
                let mut entries = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let key = match self.value()? {
                        PhpValue::Int(i) => PhpKey::Int(i),
                        PhpValue::String(s) => PhpKey::String(s),
                        other => return Err(self.error(format!("invalid array key {other:?}"))),
                    };
                    let value = self.value()?;
                    entries.push((key, value));
                }
                self.expect(b'}')?;
                Ok(PhpValue::Array(entries))
            }
            Some(b) => Err(self.error(format!("unknown type tag '{}'", b as char))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn length(&mut self) -> Result<usize> {
        let token = self.until(b':')?;
        // put the ':' back, callers expect() it for readability
        self.pos -= 1;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid length '{token}'")))
    }
}

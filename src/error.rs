// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the catalog cache.
//!
//! Errors are categorized by their source and carry enough context to
//! identify the offending operation, record or field in logs.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |--------------------|-----------|--------------------------------------------------|
//! | `Source` | Yes | Relational source unreachable or query failed |
//! | `Snapshot` | Yes | Snapshot/cursor store I/O failed |
//! | `Decode` | No | Legacy serialized blob is malformed |
//! | `MissingAttribute` | No | Record references an attribute outside the taxonomy |
//! | `Config` | No | Configuration invalid |
//!
//! # Retry Behavior
//!
//! Use [`CacheError::is_retryable()`] to decide whether the next scheduled
//! tick should simply try again. Retryable errors are transient I/O; the
//! replica keeps serving the last-known-good generation while they persist.
//! Non-retryable errors mark bad data or bad configuration: the offending
//! record or entry is skipped and logged, never the whole batch.

use thiserror::Error;

/// Result type alias for catalog cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while synchronizing or querying the catalog cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Relational source error. Transient: the next cycle retries, readers
    /// keep serving the current generation.
    #[error("source error ({operation}): {message}")]
    Source { operation: String, message: String },

    /// Snapshot or cursor store error. Transient, same policy as `Source`.
    #[error("snapshot store error ({operation}): {message}")]
    Snapshot { operation: String, message: String },

    /// A legacy serialized blob failed to decode. The owning record or
    /// change entry is skipped; processing continues.
    #[error("decode error ({context}): {message}")]
    Decode { context: String, message: String },

    /// A record references an attribute absent from the global taxonomy.
    /// Fatal for that one record; the rest of the page continues.
    #[error("product {product_id} references unknown attribute '{slug}'")]
    MissingAttribute { product_id: u64, slug: String },

    /// Configuration invalid. Not retryable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Shorthand for source I/O failures.
    pub fn source(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CacheError::Source { operation: operation.into(), message: err.to_string() }
    }

    /// Shorthand for snapshot/cursor store failures.
    pub fn snapshot(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CacheError::Snapshot { operation: operation.into(), message: err.to_string() }
    }

    /// Whether the operation should be retried at the next scheduled tick.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Source { .. } | CacheError::Snapshot { .. })
    }
}

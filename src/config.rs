// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the catalog cache.
//!
//! # Example
//!
//! ```
//! use catalog_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.poll_interval_secs, 5);
//! assert_eq!(config.scan_page_size, 100);
//!
//! // Full config
//! let config = CacheConfig {
//!     snapshot_db_url: Some("sqlite:catalog_snapshot.db".into()),
//!     poll_interval_secs: 15,
//!     reimport_time: "03:00".into(),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Configuration for the synchronization worker and its stores.
///
/// All fields have sensible defaults. Set `snapshot_db_url` for a durable
/// SQLite snapshot store; with `None` the in-memory stores are used.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Incremental change-feed poll interval in seconds (default: 5)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum change-log entries fetched per incremental cycle (default: 1000)
    #[serde(default = "default_change_batch_limit")]
    pub change_batch_limit: usize,

    /// Page size for the full-reimport bulk scan (default: 100)
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Daily full-reimport time of day, "HH:MM" UTC (default: "02:30")
    #[serde(default = "default_reimport_time")]
    pub reimport_time: String,

    /// Random jitter window added to the reimport time, in seconds
    /// (default: 300). Spreads simultaneous reimports across instances.
    #[serde(default = "default_reimport_jitter_secs")]
    pub reimport_jitter_secs: u64,

    /// SQLite connection string for the durable snapshot/cursor store
    /// (e.g. "sqlite:catalog_snapshot.db")
    #[serde(default)]
    pub snapshot_db_url: Option<String>,
}

fn default_poll_interval_secs() -> u64 { 5 }
fn default_change_batch_limit() -> usize { 1000 }
fn default_scan_page_size() -> usize { 100 }
fn default_reimport_time() -> String { "02:30".to_string() }
fn default_reimport_jitter_secs() -> u64 { 300 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            change_batch_limit: default_change_batch_limit(),
            scan_page_size: default_scan_page_size(),
            reimport_time: default_reimport_time(),
            reimport_jitter_secs: default_reimport_jitter_secs(),
            snapshot_db_url: None,
        }
    }
}

impl CacheConfig {
    /// Parse `reimport_time` into a time of day.
    pub fn parsed_reimport_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.reimport_time, "%H:%M").map_err(|e| {
            CacheError::Config(format!("reimport_time '{}' is not HH:MM: {e}", self.reimport_time))
        })
    }

    /// The change-feed poll period. Zero is rejected: the interval timer
    /// cannot run with a zero period.
    pub fn poll_interval(&self) -> Result<Duration> {
        if self.poll_interval_secs == 0 {
            return Err(CacheError::Config("poll_interval_secs must be at least 1".into()));
        }
        Ok(Duration::from_secs(self.poll_interval_secs))
    }
}

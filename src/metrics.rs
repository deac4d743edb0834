// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the catalog cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding daemon is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `catalog_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `cycle`: reimport, changes, bootstrap
//! - `operation`: products, statistics
//! - `status`: success, error, skipped

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed (or failed) synchronization cycle
pub fn record_cycle(cycle: &str, status: &str) {
    counter!(
        "catalog_cache_cycles_total",
        "cycle" => cycle.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record how long a synchronization cycle took
pub fn record_cycle_duration(cycle: &str, duration: Duration) {
    histogram!(
        "catalog_cache_cycle_seconds",
        "cycle" => cycle.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record change-feed entries applied to the cache
pub fn record_entries_applied(count: usize) {
    counter!("catalog_cache_entries_applied_total").increment(count as u64);
}

/// Record change-feed entries skipped because their payload would not decode
pub fn record_entries_skipped(count: usize) {
    counter!("catalog_cache_entries_skipped_total").increment(count as u64);
}

/// Set the size of the currently served generation
pub fn set_generation_size(count: usize) {
    gauge!("catalog_cache_generation_size").set(count as f64);
}

/// Set the persisted change-feed cursor position
pub fn set_cursor_position(position: u64) {
    gauge!("catalog_cache_cursor_position").set(position as f64);
}

/// Record a query served from the replica
pub fn record_query(operation: &str, duration: Duration) {
    counter!(
        "catalog_cache_queries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
    histogram!(
        "catalog_cache_query_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests verify the API compiles and doesn't panic.
    // In production, you'd use metrics-util's Recorder for assertions.

    #[test]
    fn test_cycle_metrics() {
        record_cycle("reimport", "success");
        record_cycle("changes", "error");
        record_cycle_duration("changes", Duration::from_millis(12));
    }

    #[test]
    fn test_entry_counters() {
        record_entries_applied(42);
        record_entries_skipped(1);
    }

    #[test]
    fn test_gauges() {
        set_generation_size(5000);
        set_cursor_position(123_456);
    }

    #[test]
    fn test_query_metrics() {
        record_query("products", Duration::from_micros(250));
        record_query("statistics", Duration::from_micros(900));
    }
}

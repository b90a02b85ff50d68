// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the roaming sync engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding daemon is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `roaming_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `family`: data, fast_status, charge_records
//! - `queue`: to_add, to_update, to_remove, fast_status, delayed_status, ...
//! - `result` / `status`: enqueued, no_operation, admin_down / success, failure

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::model::Family;
use crate::queue::QueueStats;

/// Record the acknowledgement of an enqueue call
pub fn record_enqueue(family: Family, result: &'static str, items: usize) {
    counter!(
        "roaming_sync_enqueue_calls_total",
        "family" => family.as_str(),
        "result" => result
    )
    .increment(1);
    if items > 0 {
        counter!(
            "roaming_sync_enqueued_items_total",
            "family" => family.as_str()
        )
        .increment(items as u64);
    }
}

/// Record a finished flush round
pub fn record_round(family: Family, failed: bool, duration: Duration) {
    let status = if failed { "failure" } else { "success" };
    counter!(
        "roaming_sync_rounds_total",
        "family" => family.as_str(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "roaming_sync_round_seconds",
        "family" => family.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record how many items one upload step carried
pub fn record_batch_size(family: Family, step: &'static str, count: usize) {
    histogram!(
        "roaming_sync_batch_size",
        "family" => family.as_str(),
        "step" => step
    )
    .record(count as f64);
}

/// Record a failed uploader call
pub fn record_upload_failure(family: Family, step: &'static str, kind: &'static str) {
    counter!(
        "roaming_sync_upload_failures_total",
        "family" => family.as_str(),
        "step" => step,
        "kind" => kind
    )
    .increment(1);
}

/// Record uploader call latency
pub fn record_upload_latency(family: Family, step: &'static str, duration: Duration) {
    histogram!(
        "roaming_sync_upload_seconds",
        "family" => family.as_str(),
        "step" => step
    )
    .record(duration.as_secs_f64());
}

/// Record a timer tick dropped because the family was busy
pub fn record_tick_skipped(family: Family) {
    counter!(
        "roaming_sync_ticks_skipped_total",
        "family" => family.as_str()
    )
    .increment(1);
}

/// Publish current queue depths
pub fn set_queue_depths(stats: &QueueStats) {
    let depths = [
        ("to_add", stats.to_add),
        ("to_update", stats.to_update),
        ("to_remove", stats.to_remove),
        ("fast_status", stats.fast_status),
        ("delayed_status", stats.delayed_status),
        ("fast_admin_status", stats.fast_admin_status),
        ("delayed_admin_status", stats.delayed_admin_status),
        ("charge_records", stats.charge_records),
    ];
    for (queue, depth) in depths {
        gauge!("roaming_sync_queue_depth", "queue" => queue).set(depth as f64);
    }
}

/// Track engine state transitions
pub fn set_engine_state(state: &str) {
    counter!(
        "roaming_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// A timing guard that records upload latency on drop
pub struct LatencyTimer {
    family: Family,
    step: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(family: Family, step: &'static str) -> Self {
        Self {
            family,
            step,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_upload_latency(self.family, self.step, self.start.elapsed());
    }
}

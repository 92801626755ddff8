//! # History Sync Metrics
//!
//! Prometheus metrics for the synchronization pipeline.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! history-sync = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `history_sync_records_enqueued_total` - Records handed to the queue
//! - `history_sync_records_persisted_total` - Documents inserted
//! - `history_sync_records_skipped_total` - Records already stored
//! - `history_sync_records_degraded_total` - Identity-only documents inserted
//! - `history_sync_records_abandoned_total` - Records rejected by the store
//! - `history_sync_queue_depth` - Current queue depth
//! - `history_sync_backpressure_delay_ms` - Current producer delay step
//! - `history_sync_record_process_seconds` - Per-record time of each batch

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref RECORDS_ENQUEUED: IntCounter = register_int_counter!(
        "history_sync_records_enqueued_total",
        "Total number of records handed to the sync queue"
    )
    .expect("Failed to create RECORDS_ENQUEUED metric");

    pub static ref RECORDS_PERSISTED: IntCounter = register_int_counter!(
        "history_sync_records_persisted_total",
        "Total number of documents inserted"
    )
    .expect("Failed to create RECORDS_PERSISTED metric");

    pub static ref RECORDS_SKIPPED: IntCounter = register_int_counter!(
        "history_sync_records_skipped_total",
        "Total number of records whose document already existed"
    )
    .expect("Failed to create RECORDS_SKIPPED metric");

    pub static ref RECORDS_DEGRADED: IntCounter = register_int_counter!(
        "history_sync_records_degraded_total",
        "Total number of identity-only documents inserted"
    )
    .expect("Failed to create RECORDS_DEGRADED metric");

    pub static ref RECORDS_ABANDONED: IntCounter = register_int_counter!(
        "history_sync_records_abandoned_total",
        "Total number of records rejected by the store with a non-transient error"
    )
    .expect("Failed to create RECORDS_ABANDONED metric");

    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "history_sync_queue_depth",
        "Records waiting in the sync queue"
    )
    .expect("Failed to create QUEUE_DEPTH metric");

    pub static ref BACKPRESSURE_DELAY_MS: IntGauge = register_int_gauge!(
        "history_sync_backpressure_delay_ms",
        "Current producer delay step in milliseconds"
    )
    .expect("Failed to create BACKPRESSURE_DELAY_MS metric");

    pub static ref RECORD_PROCESS_SECONDS: Histogram = register_histogram!(
        "history_sync_record_process_seconds",
        "Average per-record processing time of a batch",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .expect("Failed to create RECORD_PROCESS_SECONDS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_enqueued() {
    RECORDS_ENQUEUED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_persisted() {
    RECORDS_PERSISTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_skipped() {
    RECORDS_SKIPPED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_degraded() {
    RECORDS_DEGRADED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_abandoned() {
    RECORDS_ABANDONED.inc();
}

#[cfg(feature = "metrics")]
pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as i64);
}

#[cfg(feature = "metrics")]
pub fn set_backpressure_delay(delay: Duration) {
    BACKPRESSURE_DELAY_MS.set(delay.as_millis() as i64);
}

#[cfg(feature = "metrics")]
pub fn observe_record_process_time(per_record: Duration) {
    RECORD_PROCESS_SECONDS.observe(per_record.as_secs_f64());
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_enqueued() {}

#[cfg(not(feature = "metrics"))]
pub fn record_persisted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_skipped() {}

#[cfg(not(feature = "metrics"))]
pub fn record_degraded() {}

#[cfg(not(feature = "metrics"))]
pub fn record_abandoned() {}

#[cfg(not(feature = "metrics"))]
pub fn set_queue_depth(_depth: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn set_backpressure_delay(_delay: Duration) {}

#[cfg(not(feature = "metrics"))]
pub fn observe_record_process_time(_per_record: Duration) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_never_panics() {
        record_enqueued();
        record_persisted();
        record_skipped();
        record_degraded();
        record_abandoned();
        set_queue_depth(12);
        set_backpressure_delay(Duration::from_millis(30));
        observe_record_process_time(Duration::from_micros(250));
    }
}

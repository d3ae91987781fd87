//! Store-wide counters for insert, encode, propagation, and read activity.
//!
//! Counters are lock-free `AtomicU64` with `Relaxed` ordering: callers may
//! observe stale reads but never torn values. Snapshots serialize for
//! diagnostics; `reset_store_metrics` exists for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

static VISBIT_INSERTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_GROUPS_OPENED_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_SPARSE_ENCODINGS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_DENSE_ENCODINGS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_PROPAGATED_UNIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_READS_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_READ_MISSES_TOTAL: AtomicU64 = AtomicU64::new(0);
static VISBIT_PLACEHOLDER_READS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time snapshot of the store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreMetricsSnapshot {
    pub visbit_inserts_total: u64,
    pub visbit_groups_opened_total: u64,
    pub visbit_sparse_encodings_total: u64,
    pub visbit_dense_encodings_total: u64,
    pub visbit_propagated_unions_total: u64,
    pub visbit_reads_total: u64,
    pub visbit_read_misses_total: u64,
    pub visbit_placeholder_reads_total: u64,
}

/// Read current store metrics.
#[must_use]
pub fn store_metrics() -> StoreMetricsSnapshot {
    StoreMetricsSnapshot {
        visbit_inserts_total: VISBIT_INSERTS_TOTAL.load(Ordering::Relaxed),
        visbit_groups_opened_total: VISBIT_GROUPS_OPENED_TOTAL.load(Ordering::Relaxed),
        visbit_sparse_encodings_total: VISBIT_SPARSE_ENCODINGS_TOTAL.load(Ordering::Relaxed),
        visbit_dense_encodings_total: VISBIT_DENSE_ENCODINGS_TOTAL.load(Ordering::Relaxed),
        visbit_propagated_unions_total: VISBIT_PROPAGATED_UNIONS_TOTAL.load(Ordering::Relaxed),
        visbit_reads_total: VISBIT_READS_TOTAL.load(Ordering::Relaxed),
        visbit_read_misses_total: VISBIT_READ_MISSES_TOTAL.load(Ordering::Relaxed),
        visbit_placeholder_reads_total: VISBIT_PLACEHOLDER_READS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset all counters to zero (tests/diagnostics).
pub fn reset_store_metrics() {
    VISBIT_INSERTS_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_GROUPS_OPENED_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_SPARSE_ENCODINGS_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_DENSE_ENCODINGS_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_PROPAGATED_UNIONS_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_READS_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_READ_MISSES_TOTAL.store(0, Ordering::Relaxed);
    VISBIT_PLACEHOLDER_READS_TOTAL.store(0, Ordering::Relaxed);
}

/// Record a three-phase insert entering phase 1.
pub(crate) fn record_insert() {
    VISBIT_INSERTS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a new version group being opened.
pub(crate) fn record_group_opened() {
    VISBIT_GROUPS_OPENED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a delta encoded sparsely.
pub(crate) fn record_sparse_encoding() {
    VISBIT_SPARSE_ENCODINGS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a delta that fell back to the dense full-image payload.
pub(crate) fn record_dense_encoding() {
    VISBIT_DENSE_ENCODINGS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record one propagation union into an older sibling.
pub(crate) fn record_propagated_union() {
    VISBIT_PROPAGATED_UNIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a snapshot read.
pub(crate) fn record_read() {
    VISBIT_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a snapshot read that found nothing.
pub(crate) fn record_read_miss() {
    VISBIT_READ_MISSES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Record a read that matched a still-unmaterialized placeholder.
pub(crate) fn record_placeholder_read() {
    VISBIT_PLACEHOLDER_READS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

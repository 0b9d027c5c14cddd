//! Engine counters
//!
//! - Counters only, monotonic
//! - Relaxed atomics; exactness across threads is not required

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one `Engine`
#[derive(Debug, Default)]
pub struct EngineMetrics {
    queries_compiled: AtomicU64,
    sub_queries_executed: AtomicU64,
    fast_path_lookups: AtomicU64,
    records_excluded: AtomicU64,
    records_rejected_in_memory: AtomicU64,
    update_candidates: AtomicU64,
    updates_applied: AtomicU64,
    updates_skipped: AtomicU64,
    cursor_save_failures: AtomicU64,
    storage_failures: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_compiled: u64,
    pub sub_queries_executed: u64,
    pub fast_path_lookups: u64,
    pub records_excluded: u64,
    pub records_rejected_in_memory: u64,
    pub update_candidates: u64,
    pub updates_applied: u64,
    pub updates_skipped: u64,
    pub cursor_save_failures: u64,
    pub storage_failures: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_queries_compiled(&self) {
        self.queries_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sub_queries_executed(&self, n: u64) {
        self.sub_queries_executed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_fast_path_lookups(&self) {
        self.fast_path_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_excluded(&self) {
        self.records_excluded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_rejected(&self) {
        self.records_rejected_in_memory.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_update_candidates(&self, n: u64) {
        self.update_candidates.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_updates_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updates_skipped(&self) {
        self.updates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cursor_save_failures(&self) {
        self.cursor_save_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_storage_failures(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_compiled: self.queries_compiled.load(Ordering::Relaxed),
            sub_queries_executed: self.sub_queries_executed.load(Ordering::Relaxed),
            fast_path_lookups: self.fast_path_lookups.load(Ordering::Relaxed),
            records_excluded: self.records_excluded.load(Ordering::Relaxed),
            records_rejected_in_memory: self.records_rejected_in_memory.load(Ordering::Relaxed),
            update_candidates: self.update_candidates.load(Ordering::Relaxed),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            updates_skipped: self.updates_skipped.load(Ordering::Relaxed),
            cursor_save_failures: self.cursor_save_failures.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }
}

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;

/// Live engine counters.
///
/// Hot paths use relaxed atomic increments; the service periodically folds
/// the counters into a locked aggregate snapshot so readers never contend
/// with schedulers.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Successfully scheduled notifications
    pub scheduled_total: AtomicU64,
    /// Cancelled notifications (only those actually tracked)
    pub cancelled_total: AtomicU64,
    /// Platform/persistence/handler failures
    pub errors_total: AtomicU64,
    /// Pool acquires served from the pool
    pub pool_hits: AtomicU64,
    /// Pool acquires that allocated fresh
    pub pool_misses: AtomicU64,
    /// Actions dropped by the main-thread queue under overflow
    pub queue_drops: AtomicU64,
    /// Completed store flushes
    pub flushes_total: AtomicU64,
    /// Sum of flush latencies in milliseconds
    pub flush_latency_sum_ms: AtomicU64,

    aggregate: Mutex<MetricsSnapshot>,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scheduled(&self) {
        self.scheduled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self, count: u64) {
        self.cancelled_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, latency_ms: u64) {
        self.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.flush_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    /// Average persistence flush latency in milliseconds.
    ///
    /// Returns None before the first completed flush.
    pub fn average_flush_latency_ms(&self) -> Option<f64> {
        let total = self.flushes_total.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let sum = self.flush_latency_sum_ms.load(Ordering::Relaxed);
        Some(sum as f64 / total as f64)
    }

    /// Pool hit rate in [0.0, 1.0]; 0.0 before any pool traffic.
    pub fn pool_hit_rate(&self) -> f64 {
        let hits = self.pool_hits.load(Ordering::Relaxed);
        let misses = self.pool_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Read the live counters into a snapshot.
    pub fn snapshot_now(&self, approx_memory_bytes: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            scheduled_total: self.scheduled_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            pool_hits: self.pool_hits.load(Ordering::Relaxed),
            pool_misses: self.pool_misses.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            flushes_total: self.flushes_total.load(Ordering::Relaxed),
            avg_flush_latency_ms: self.average_flush_latency_ms(),
            approx_memory_bytes,
        }
    }

    /// Fold the live counters into the locked aggregate.
    pub fn fold(&self, approx_memory_bytes: u64) {
        let snapshot = self.snapshot_now(approx_memory_bytes);
        *self.aggregate.lock() = snapshot;
    }

    /// The aggregate snapshot as of the last fold.
    pub fn latest(&self) -> MetricsSnapshot {
        self.aggregate.lock().clone()
    }

    /// Serialize the latest aggregate snapshot to a file.
    pub fn export_to_file(&self, path: &Path) -> Result<(), EngineError> {
        let snapshot = self.latest();
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| EngineError::internal(format!("metrics serialization: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| EngineError::persistence(format!("metrics export: {e}")))?;
        Ok(())
    }

    /// Log a one-line summary of the latest aggregate.
    pub fn log_summary(&self) {
        let s = self.latest();
        info!(
            scheduled = s.scheduled_total,
            cancelled = s.cancelled_total,
            errors = s.errors_total,
            pool_hits = s.pool_hits,
            pool_misses = s.pool_misses,
            queue_drops = s.queue_drops,
            flushes = s.flushes_total,
            avg_flush_latency_ms = s.avg_flush_latency_ms.unwrap_or(0.0),
            approx_memory_bytes = s.approx_memory_bytes,
            "Notification engine metrics"
        );
    }
}

/// A point-in-time snapshot of all metric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub scheduled_total: u64,
    pub cancelled_total: u64,
    pub errors_total: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub queue_drops: u64,
    pub flushes_total: u64,
    pub avg_flush_latency_ms: Option<f64>,
    pub approx_memory_bytes: u64,
}

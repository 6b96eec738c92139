//! Cache Statistics Module
//!
//! Tracks read and expiry counters for a cache instance.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads served from the hot-read buffer
    pub buffer_hits: u64,
    /// Reads that went to disk
    pub disk_reads: u64,
    /// Reads of keys not in the metadata store
    pub misses: u64,
    /// Entries removed by their expiry timer
    pub expirations: u64,
    /// Current number of live entries
    pub total_entries: usize,
    /// Sum of formatted sizes of live entries
    pub total_bytes: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Fraction of successful reads served from the buffer.
    ///
    /// Returns 0.0 if no successful reads have been made.
    pub fn buffer_hit_rate(&self) -> f64 {
        let total = self.buffer_hits + self.disk_reads;
        if total == 0 {
            0.0
        } else {
            self.buffer_hits as f64 / total as f64
        }
    }
}

// == Counters ==
/// Live counters, updated without locking.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    buffer_hits: AtomicU64,
    disk_reads: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    pub(crate) fn record_buffer_hit(&self) {
        self.buffer_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_read(&self) {
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot with the entry totals filled in by the caller.
    pub(crate) fn snapshot(&self, total_entries: usize, total_bytes: u64) -> CacheStats {
        CacheStats {
            buffer_hits: self.buffer_hits.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            total_entries,
            total_bytes,
        }
    }
}

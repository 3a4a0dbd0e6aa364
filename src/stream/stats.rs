//! Read engine counters.
//!
//! Metrics backends live outside this crate; these atomics are the hook
//! points they (and the tests) read.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of the read engine.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Gets accepted
    pub gets_total: AtomicU64,
    /// Gets that returned an error
    pub gets_failed: AtomicU64,
    /// Gets fully served by the data-shard-only path
    pub fast_path_reads: AtomicU64,
    /// Fast path attempts that fell back to the general path
    pub fast_path_fallbacks: AtomicU64,
    /// Blobs read successfully
    pub blobs_read: AtomicU64,
    /// Blobs that needed EC reconstruction
    pub blobs_reconstructed: AtomicU64,
    /// Blobs failed for lack of live shards
    pub blobs_broken: AtomicU64,
    /// Shard outcomes by status
    pub shards_ok: AtomicU64,
    pub shards_failed: AtomicU64,
    pub shards_canceled: AtomicU64,
    /// Empty data shards served as zeros without network
    pub shards_empty: AtomicU64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            gets_total: self.gets_total.load(Ordering::Relaxed),
            gets_failed: self.gets_failed.load(Ordering::Relaxed),
            fast_path_reads: self.fast_path_reads.load(Ordering::Relaxed),
            fast_path_fallbacks: self.fast_path_fallbacks.load(Ordering::Relaxed),
            blobs_read: self.blobs_read.load(Ordering::Relaxed),
            blobs_reconstructed: self.blobs_reconstructed.load(Ordering::Relaxed),
            blobs_broken: self.blobs_broken.load(Ordering::Relaxed),
            shards_ok: self.shards_ok.load(Ordering::Relaxed),
            shards_failed: self.shards_failed.load(Ordering::Relaxed),
            shards_canceled: self.shards_canceled.load(Ordering::Relaxed),
            shards_empty: self.shards_empty.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub gets_total: u64,
    pub gets_failed: u64,
    pub fast_path_reads: u64,
    pub fast_path_fallbacks: u64,
    pub blobs_read: u64,
    pub blobs_reconstructed: u64,
    pub blobs_broken: u64,
    pub shards_ok: u64,
    pub shards_failed: u64,
    pub shards_canceled: u64,
    pub shards_empty: u64,
}

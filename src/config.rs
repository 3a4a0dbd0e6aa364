//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration of the read engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Local IDC, used to sort shard placements by locality
    pub idc: String,

    /// Initial over-read beyond the n data shards
    pub min_read_shards_x: usize,

    /// Upper bound on a location's blob_size; larger locations are rejected
    pub max_blob_size: u32,

    /// How long a punished disk stays sorted to the back
    pub disk_punish_interval_s: u64,

    /// Attempts when resolving a cluster's controllers
    pub alloc_retry_times: u32,

    /// Delay between cluster resolution attempts
    pub alloc_retry_interval_ms: u64,

    /// Per shard-read deadline
    pub shard_timeout_ms: u64,

    /// Concurrent shard reads across all Gets
    pub max_concurrent_shard_reads: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idc: String::new(),
            min_read_shards_x: 1,
            max_blob_size: 4 << 20,
            disk_punish_interval_s: 60,
            alloc_retry_times: 3,
            alloc_retry_interval_ms: 200,
            shard_timeout_ms: 5_000,
            max_concurrent_shard_reads: 64,
        }
    }
}

impl StreamConfig {
    /// Punish interval as a duration.
    pub fn disk_punish_interval(&self) -> Duration {
        Duration::from_secs(self.disk_punish_interval_s)
    }

    /// Shard read deadline as a duration.
    pub fn shard_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_timeout_ms)
    }
}

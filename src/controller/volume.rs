//! Volume layout resolution with an eventually consistent cache.
//!
//! The cache is not authoritative for `(disk_id, vuid)` identity; storage
//! node answers are. When a node reports `DiskNotFound`/`VuidNotFound`
//! the shard reader forces a refresh here and retries the same unit index
//! against the newly resolved target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::codemode::CodeMode;
use crate::error::Result;
use crate::location::{ClusterId, DiskId, Vid, Vuid};

/// One placement slot of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub vuid: Vuid,
    pub disk_id: DiskId,
    pub host: String,
}

/// Physical layout of a volume: its code mode and `n + m + l` units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePhy {
    pub vid: Vid,
    pub code_mode: CodeMode,
    pub units: Vec<Unit>,
}

/// Injected upstream that looks up a volume's layout.
#[async_trait]
pub trait VolumeSource: Send + Sync {
    async fn lookup(&self, cluster_id: ClusterId, vid: Vid) -> Result<VolumePhy>;
}

/// Volume cache of one cluster.
pub struct VolumeGetter {
    cluster_id: ClusterId,
    source: Arc<dyn VolumeSource>,
    volumes: DashMap<Vid, Arc<VolumePhy>>,
    forced_refreshes: AtomicU64,
}

impl VolumeGetter {
    pub fn new(cluster_id: ClusterId, source: Arc<dyn VolumeSource>) -> Self {
        Self {
            cluster_id,
            source,
            volumes: DashMap::new(),
            forced_refreshes: AtomicU64::new(0),
        }
    }

    /// Resolve a volume's layout.
    ///
    /// With `allow_cache` a cached snapshot is returned if present; with
    /// `allow_cache = false` the upstream is always consulted and the
    /// cached entry atomically replaced.
    pub async fn get(&self, vid: Vid, allow_cache: bool) -> Result<Arc<VolumePhy>> {
        if allow_cache {
            if let Some(cached) = self.volumes.get(&vid) {
                return Ok(Arc::clone(&cached));
            }
        } else {
            self.forced_refreshes.fetch_add(1, Ordering::Relaxed);
        }

        let fetched = Arc::new(self.source.lookup(self.cluster_id, vid).await?);
        self.volumes.insert(vid, Arc::clone(&fetched));
        debug!(cluster = %self.cluster_id, %vid, units = fetched.units.len(), forced = !allow_cache,
            "volume layout resolved");
        Ok(fetched)
    }

    /// Number of forced (cache-bypassing) refreshes performed.
    pub fn forced_refreshes(&self) -> u64 {
        self.forced_refreshes.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct FakeSource {
        lookups: AtomicUsize,
        layout: Mutex<VolumePhy>,
    }

    fn layout(epoch: u32) -> VolumePhy {
        VolumePhy {
            vid: Vid(1),
            code_mode: CodeMode::EC6P6,
            units: (0..12)
                .map(|i| Unit {
                    vuid: Vuid::new(Vid(1), i as u8, epoch),
                    disk_id: DiskId(100 + i),
                    host: format!("http://node-{i}:8889"),
                })
                .collect(),
        }
    }

    #[async_trait]
    impl VolumeSource for FakeSource {
        async fn lookup(&self, _cluster_id: ClusterId, _vid: Vid) -> Result<VolumePhy> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.layout.lock().clone())
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let source = Arc::new(FakeSource {
            lookups: AtomicUsize::new(0),
            layout: Mutex::new(layout(1)),
        });
        let getter = VolumeGetter::new(ClusterId(1), source.clone());

        let a = getter.get(Vid(1), true).await.unwrap();
        let b = getter.get(Vid(1), true).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(getter.forced_refreshes(), 0);
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_snapshot() {
        let source = Arc::new(FakeSource {
            lookups: AtomicUsize::new(0),
            layout: Mutex::new(layout(1)),
        });
        let getter = VolumeGetter::new(ClusterId(1), source.clone());

        let old = getter.get(Vid(1), true).await.unwrap();
        *source.layout.lock() = layout(2);

        let fresh = getter.get(Vid(1), false).await.unwrap();
        assert_ne!(old.units[0].vuid, fresh.units[0].vuid);
        assert_eq!(getter.forced_refreshes(), 1);

        // subsequent cached reads see the new snapshot
        let cached = getter.get(Vid(1), true).await.unwrap();
        assert_eq!(cached, fresh);
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }
}

//! Disk host resolution and transient disk punishment.
//!
//! Punishment is strictly local to this process and decays after the
//! configured interval; it only demotes a disk in read ordering, it never
//! removes one. Two intensities exist: a full punish for hard disk
//! faults, and a threshold punish for soft signals (timeouts, stale
//! routing). Both share the one mechanism and interval; they differ in
//! which counter they bump and what gets logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::location::{ClusterId, DiskId};

/// Host and failure domain of a disk, as the upstream directory knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdc {
    pub host: String,
    pub idc: String,
}

/// A disk's placement plus its current punishment verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskHost {
    pub host: String,
    pub idc: String,
    pub punished: bool,
}

/// Injected upstream that maps a disk to its host and IDC.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn disk_info(&self, cluster_id: ClusterId, disk_id: DiskId) -> Result<HostIdc>;
}

/// Disk router of one cluster.
pub struct ServiceController {
    cluster_id: ClusterId,
    directory: Arc<dyn ServiceDirectory>,
    punish_interval: Duration,

    disks: DashMap<DiskId, Arc<HostIdc>>,
    punished: DashMap<DiskId, Instant>,

    punish_full: AtomicU64,
    punish_threshold: AtomicU64,
}

impl ServiceController {
    pub fn new(
        cluster_id: ClusterId,
        directory: Arc<dyn ServiceDirectory>,
        punish_interval: Duration,
    ) -> Self {
        Self {
            cluster_id,
            directory,
            punish_interval,
            disks: DashMap::new(),
            punished: DashMap::new(),
            punish_full: AtomicU64::new(0),
            punish_threshold: AtomicU64::new(0),
        }
    }

    /// Resolve a disk's host, IDC and punishment state.
    ///
    /// Cache misses go upstream; hits return the cached immutable
    /// snapshot. The punished flag is always evaluated at call time.
    pub async fn disk_host(&self, disk_id: DiskId) -> Result<DiskHost> {
        let info = match self.disks.get(&disk_id) {
            Some(cached) => Arc::clone(&cached),
            None => {
                let fetched = Arc::new(self.directory.disk_info(self.cluster_id, disk_id).await?);
                self.disks.insert(disk_id, Arc::clone(&fetched));
                debug!(cluster = %self.cluster_id, disk = %disk_id, host = %fetched.host, "cached disk host");
                fetched
            }
        };

        Ok(DiskHost {
            host: info.host.clone(),
            idc: info.idc.clone(),
            punished: self.is_punished(disk_id),
        })
    }

    /// Hard-punish a disk after an unrecoverable fault.
    pub fn punish(&self, disk_id: DiskId, reason: &str) {
        self.punish_full.fetch_add(1, Ordering::Relaxed);
        self.set_punished(disk_id);
        info!(cluster = %self.cluster_id, disk = %disk_id, reason, "punish disk");
    }

    /// Soft-punish a disk after an advisory signal.
    pub fn punish_threshold(&self, disk_id: DiskId, reason: &str) {
        self.punish_threshold.fetch_add(1, Ordering::Relaxed);
        self.set_punished(disk_id);
        debug!(cluster = %self.cluster_id, disk = %disk_id, reason, "punish threshold disk");
    }

    /// Is the disk currently punished?
    pub fn is_punished(&self, disk_id: DiskId) -> bool {
        match self.punished.get(&disk_id) {
            Some(until) => {
                if Instant::now() < *until {
                    true
                } else {
                    drop(until);
                    self.punished.remove(&disk_id);
                    false
                }
            }
            None => false,
        }
    }

    /// (full, threshold) punish event counts.
    pub fn punish_counts(&self) -> (u64, u64) {
        (
            self.punish_full.load(Ordering::Relaxed),
            self.punish_threshold.load(Ordering::Relaxed),
        )
    }

    fn set_punished(&self, disk_id: DiskId) {
        self.punished
            .insert(disk_id, Instant::now() + self.punish_interval);
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Routing metadata controllers: disk hosts and volume layouts.
//!
//! Both caches are shared by every concurrent Get. Readers dominate, so
//! entries are immutable `Arc` snapshots swapped whole on refresh; no
//! reader ever observes a half-updated unit list.

pub mod service;
pub mod volume;

use dashmap::DashMap;
use std::sync::Arc;

use crate::location::ClusterId;

pub use service::{DiskHost, HostIdc, ServiceController, ServiceDirectory};
pub use volume::{Unit, VolumeGetter, VolumePhy, VolumeSource};

/// Per-cluster controller pair.
#[derive(Clone)]
pub struct ClusterHandles {
    pub service: Arc<ServiceController>,
    pub volumes: Arc<VolumeGetter>,
}

/// Registry of the clusters this process can read from.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: DashMap<ClusterId, ClusterHandles>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a cluster's controllers.
    pub fn register(
        &self,
        cluster_id: ClusterId,
        service: Arc<ServiceController>,
        volumes: Arc<VolumeGetter>,
    ) {
        self.clusters
            .insert(cluster_id, ClusterHandles { service, volumes });
    }

    /// Controllers of one cluster, if routed.
    pub fn handles(&self, cluster_id: ClusterId) -> Option<ClusterHandles> {
        self.clusters.get(&cluster_id).map(|h| h.clone())
    }
}

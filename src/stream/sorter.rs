//! Read-order sorting of volume units by locality and health.
//!
//! Units are bucketed by a distance key and shuffled within buckets so
//! load spreads across equally good choices:
//!   0 same IDC, not punished
//!   1 other IDC, not punished
//!   2 same IDC, punished
//!   3 other IDC, punished
//! Punished disks stay in the order (they may still answer) but only
//! after every healthier option.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::warn;

use crate::controller::{ServiceController, Unit};
use crate::location::{DiskId, Vuid};
use crate::retry;

/// One unit in read order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortedUnit {
    /// Position in the volume's unit list (== EC shard index)
    pub index: usize,
    pub vuid: Vuid,
    pub disk_id: DiskId,
    pub host: String,
}

pub(crate) fn distance(local_idc: &str, disk_idc: &str, punished: bool) -> u8 {
    match (local_idc == disk_idc, punished) {
        (true, false) => 0,
        (false, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    }
}

/// Produce the read order over the first `n + m` units of a volume.
///
/// Units whose disk cannot be resolved are dropped; the caller treats a
/// result shorter than `n` as a broken blob.
pub(crate) async fn sort_units_by_idc(
    service: &ServiceController,
    local_idc: &str,
    units: &[Unit],
) -> Vec<SortedUnit> {
    let mut groups: BTreeMap<u8, Vec<SortedUnit>> = BTreeMap::new();

    for (index, unit) in units.iter().enumerate() {
        let host_info = match retry::exponential(2, Duration::from_millis(100), || {
            service.disk_host(unit.disk_id)
        })
        .await
        {
            Ok(info) => info,
            Err(e) => {
                warn!(vuid = %unit.vuid, disk = %unit.disk_id, error = %e, "no host of disk");
                continue;
            }
        };

        let dis = distance(local_idc, &host_info.idc, host_info.punished);
        groups.entry(dis).or_default().push(SortedUnit {
            index,
            vuid: unit.vuid,
            disk_id: unit.disk_id,
            // read from the host recorded in the volume layout
            host: unit.host.clone(),
        });
    }

    let mut rng = rand::rng();
    let mut sorted = Vec::with_capacity(units.len());
    for (_, mut group) in groups {
        group.shuffle(&mut rng);
        sorted.extend(group);
    }
    sorted
}

// =============================================================================
// Tests
// =============================================================================

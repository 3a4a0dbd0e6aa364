//! Per-shard fetch with error classification and recovery.
//!
//! A shard read owes the layers above one of three things: the bytes, a
//! failure (after punishing the disk or refreshing stale routing as the
//! error class dictates), or a prompt cancellation. Retry happens here
//! only for transient errors; anything the transport classifies as a
//! re-route signal short-circuits so the blob reader can escalate to
//! another unit instead.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{ServiceController, VolumeGetter};
use crate::location::BlobRef;
use crate::pool::MemPool;
use crate::stream::sorter::SortedUnit;
use crate::transport::{CommandGuard, RangeGetArgs, ShardError, ShardPayload, StorageNodeClient};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Outcome of one shard read task.
#[derive(Debug)]
pub(crate) struct ShardOutcome {
    pub index: usize,
    pub status: ShardStatus,
}

#[derive(Debug)]
pub(crate) enum ShardStatus {
    /// Shard bytes in a pooled buffer
    Ok(Vec<u8>),
    Failed,
    Canceled,
    /// Zero padding, served without network
    Empty,
}

/// Everything a shard read task needs, cheap to clone into tasks.
pub(crate) struct ShardFetcher {
    pub client: Arc<dyn StorageNodeClient>,
    pub guard: CommandGuard,
    pub service: Arc<ServiceController>,
    pub volumes: Arc<VolumeGetter>,
    pub pool: Arc<MemPool>,
}

impl ShardFetcher {
    /// Read one whole shard for the blob reader.
    pub(crate) async fn read_one_shard(
        &self,
        blob: &BlobRef,
        unit: &SortedUnit,
        shard_size: usize,
        cancel: &CancellationToken,
    ) -> ShardOutcome {
        let fetch = self.fetch_with_reroute(blob, unit, 0, shard_size as u64, Some(cancel));
        let payload = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(vid = %blob.vid, bid = %blob.bid, index = unit.index, "read shard canceled");
                return ShardOutcome { index: unit.index, status: ShardStatus::Canceled };
            }
            res = fetch => match res {
                Ok(payload) => payload,
                Err(ShardError::Canceled) => {
                    return ShardOutcome { index: unit.index, status: ShardStatus::Canceled };
                }
                Err(e) => {
                    warn!(vid = %blob.vid, bid = %blob.bid, index = unit.index,
                        disk = %unit.disk_id, host = %unit.host, error = %e, "read shard failed");
                    return ShardOutcome { index: unit.index, status: ShardStatus::Failed };
                }
            },
        };

        match self.verified_copy(&payload, shard_size as u64) {
            Ok(buf) => ShardOutcome {
                index: unit.index,
                status: ShardStatus::Ok(buf),
            },
            Err(e) => {
                warn!(vid = %blob.vid, bid = %blob.bid, index = unit.index, error = %e,
                    "shard payload rejected");
                ShardOutcome {
                    index: unit.index,
                    status: ShardStatus::Failed,
                }
            }
        }
    }

    /// Copy a payload into a pooled buffer, checking length and crc.
    pub(crate) fn verified_copy(
        &self,
        payload: &ShardPayload,
        want: u64,
    ) -> crate::error::Result<Vec<u8>> {
        verify_payload(payload, want).map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        let mut buf = self.pool.alloc(payload.body.len())?;
        buf.copy_from_slice(&payload.body);
        Ok(buf)
    }

    /// Fetch a shard range, recovering from classified errors.
    ///
    /// At most one forced volume refresh happens per call: on the first
    /// identity mismatch the unit index is re-resolved and, if it moved to
    /// an unpunished disk, re-issued once against the new target. Every
    /// other mismatch is a hard failure of this unit.
    pub(crate) async fn fetch_with_reroute(
        &self,
        blob: &BlobRef,
        unit: &SortedUnit,
        offset: u64,
        size: u64,
        cancel: Option<&CancellationToken>,
    ) -> std::result::Result<ShardPayload, ShardError> {
        let mut host = unit.host.clone();
        let mut disk_id = unit.disk_id;
        let mut vuid = unit.vuid;
        let mut refreshed = false;

        let mut delay = BACKOFF_BASE;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(cancel) = cancel {
                if cancel.is_cancelled() {
                    return Err(ShardError::Canceled);
                }
            }

            let args = RangeGetArgs {
                disk_id,
                vuid,
                bid: blob.bid,
                offset,
                size,
            };
            let err = match self.guard.run(self.client.range_get(&host, &args)).await {
                Ok(payload) => return Ok(payload),
                Err(e) => e,
            };

            match err {
                ShardError::Overload | ShardError::Canceled => return Err(err),

                ShardError::DiskBroken | ShardError::VuidReadonly => {
                    self.service.punish(disk_id, "broken_or_ro");
                    return Err(err);
                }

                ShardError::Timeout => {
                    self.service.punish_threshold(disk_id, "timeout");
                    return Err(err);
                }

                ShardError::DiskNotFound | ShardError::VuidNotFound => {
                    if refreshed {
                        // the refreshed target is wrong too; give up on this unit
                        self.service.punish_threshold(disk_id, "not_found");
                        return Err(err);
                    }
                    refreshed = true;

                    match self.volumes.get(blob.vid, false).await {
                        Ok(latest) => {
                            let new_unit = latest.units.get(unit.index);
                            let mut retargeted = false;
                            if let Some(new_unit) = new_unit {
                                if new_unit.disk_id != disk_id {
                                    if let Ok(hi) = self.service.disk_host(new_unit.disk_id).await {
                                        if !hi.punished {
                                            info!(vid = %blob.vid, index = unit.index,
                                                old = %disk_id, new = %new_unit.disk_id,
                                                "volume info outdated, re-targeting unit");
                                            host = hi.host;
                                            disk_id = new_unit.disk_id;
                                            vuid = new_unit.vuid;
                                            retargeted = true;
                                        }
                                    }
                                }
                            }
                            if !retargeted {
                                self.service.punish_threshold(disk_id, "not_found");
                                return Err(err);
                            }
                        }
                        Err(e) => {
                            warn!(vid = %blob.vid, error = %e, "refresh volume with no cache");
                        }
                    }
                }

                ShardError::Other(ref detail) => {
                    debug!(disk = %disk_id, error = %detail, "transient shard read error");
                }
            }

            if attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            sleep(delay).await;
            delay *= 2;
        }
    }
}

fn verify_payload(payload: &ShardPayload, want: u64) -> std::result::Result<(), ShardError> {
    if payload.body.len() as u64 != want {
        return Err(ShardError::Other(format!(
            "short shard body {} of {}",
            payload.body.len(),
            want
        )));
    }
    if crc32fast::hash(&payload.body) != payload.crc {
        return Err(ShardError::Other("shard crc mismatch".to_string()));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

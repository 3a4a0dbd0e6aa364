//! Small-read fast path: data shards only, no reconstruction.
//!
//! Small blobs sit entirely in the first shard (shards are floored at
//! the tactic's minimum size) and small ranges touch only a few data
//! shards, so the common case needs neither parity buffers nor the
//! speculative fan-out. Any shard error here means the general path
//! should take over; this path never retries its way around a bad unit.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::ec::buffer_sizes;
use crate::error::{Error, Result};
use crate::location::{BlobRef, ClusterId};
use crate::stream::shard::ShardFetcher;
use crate::stream::sorter::SortedUnit;

/// Verdict of the fast path.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FastRead {
    /// Bytes written, the Get is complete
    Done,
    /// A shard did not cooperate; run the reconstructing path
    NeedReconstruct,
}

/// Serve a single-blob read from data shards alone.
pub(crate) async fn get_data_shards_only<W>(
    fetcher: &ShardFetcher,
    cluster_id: ClusterId,
    blob: &BlobRef,
    writer: &mut W,
) -> Result<FastRead>
where
    W: AsyncWrite + Unpin + Send,
{
    if blob.read_size == 0 {
        return Ok(FastRead::Done);
    }

    let volume = fetcher.volumes.get(blob.vid, true).await?;
    let tactic = volume.code_mode.tactic();
    let sizes = buffer_sizes(blob.blob_size as usize, &tactic)?;
    let shard_size = sizes.shard_size as u64;

    let first_shard_idx = (blob.offset / shard_size) as usize;
    let mut shard_offset = blob.offset % shard_size;

    let mut range_buf = fetcher.pool.alloc(blob.read_size as usize)?;

    let mut remain = blob.read_size;
    let mut buf_offset = 0usize;
    for (i, unit) in volume.units[first_shard_idx..tactic.n].iter().enumerate() {
        if remain == 0 {
            break;
        }

        let index = first_shard_idx + i;
        let to_read = remain.min(shard_size - shard_offset);
        let target = SortedUnit {
            index,
            vuid: unit.vuid,
            disk_id: unit.disk_id,
            host: unit.host.clone(),
        };

        let payload = match fetcher
            .fetch_with_reroute(blob, &target, shard_offset, to_read, None)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cluster = %cluster_id, vid = %blob.vid, bid = %blob.bid,
                    index, disk = %unit.disk_id, error = %e, "read data shard only failed");
                fetcher.pool.put(range_buf);
                return Ok(FastRead::NeedReconstruct);
            }
        };
        if payload.body.len() as u64 != to_read
            || crc32fast::hash(&payload.body) != payload.crc
        {
            warn!(cluster = %cluster_id, vid = %blob.vid, bid = %blob.bid, index,
                "data shard payload rejected");
            fetcher.pool.put(range_buf);
            return Ok(FastRead::NeedReconstruct);
        }

        range_buf[buf_offset..buf_offset + to_read as usize].copy_from_slice(&payload.body);

        shard_offset = 0;
        remain -= to_read;
        buf_offset += to_read as usize;
    }

    if remain > 0 {
        fetcher.pool.put(range_buf);
        return Err(Error::Internal(format!("no enough data to read {remain}")));
    }

    debug!(cluster = %cluster_id, vid = %blob.vid, bid = %blob.bid,
        read_size = blob.read_size, "read data shard only");

    let write_res = writer.write_all(&range_buf[..blob.read_size as usize]).await;
    fetcher.pool.put(range_buf);
    write_res.map_err(|e| Error::Canceled(format!("write to response ({e})")))?;

    Ok(FastRead::Done)
}

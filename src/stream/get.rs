//! The Get pipeline: location in, bytes out.
//!
//! Data flow:
//!
//! ```text
//! caller <--copy-- blob range walk <--swap-- blob reader <--copy-- storage node
//! ```
//!
//! Blobs are processed serially; within a blob, shard reads fan out.
//! All `n + m` shard buffers of a blob are allocated up front and every
//! one of them is back in the pool by the time the blob's bytes have
//! been written (or its error surfaced).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::codemode::CodeMode;
use crate::config::StreamConfig;
use crate::controller::{ClusterHandles, ClusterRegistry, VolumePhy};
use crate::ec::{buffer_sizes, ReedSolomonCodec, ShardCodec};
use crate::error::{Error, Result};
use crate::location::{gen_blob_refs, BlobRef, Location};
use crate::pool::MemPool;
use crate::retry;
use crate::stream::blob::BlobReader;
use crate::stream::data_only::{get_data_shards_only, FastRead};
use crate::stream::shard::ShardFetcher;
use crate::stream::sorter::{sort_units_by_idc, SortedUnit};
use crate::stream::stats::StreamStats;
use crate::transport::{CommandGuard, StorageNodeClient};

/// The read engine.
///
/// One handler serves any number of concurrent Gets; the disk and volume
/// caches, the buffer pool and the shard-read concurrency budget are
/// shared across all of them.
pub struct Handler {
    config: StreamConfig,
    pool: Arc<MemPool>,
    codecs: HashMap<CodeMode, Arc<dyn ShardCodec>>,
    registry: Arc<ClusterRegistry>,
    client: Arc<dyn StorageNodeClient>,
    guard: CommandGuard,
    stats: Arc<StreamStats>,
}

impl Handler {
    /// Build a handler with the default buffer pool.
    pub fn new(
        config: StreamConfig,
        registry: Arc<ClusterRegistry>,
        client: Arc<dyn StorageNodeClient>,
    ) -> Result<Self> {
        Self::with_pool(config, registry, client, Arc::new(MemPool::default()))
    }

    /// Build a handler sharing an existing buffer pool.
    pub fn with_pool(
        config: StreamConfig,
        registry: Arc<ClusterRegistry>,
        client: Arc<dyn StorageNodeClient>,
        pool: Arc<MemPool>,
    ) -> Result<Self> {
        let mut codecs: HashMap<CodeMode, Arc<dyn ShardCodec>> = HashMap::new();
        for mode in CodeMode::all() {
            codecs.insert(*mode, Arc::new(ReedSolomonCodec::new(&mode.tactic())?));
        }
        let guard = CommandGuard::new(config.max_concurrent_shard_reads, config.shard_timeout());
        Ok(Self {
            config,
            pool,
            codecs,
            registry,
            client,
            guard,
            stats: Arc::new(StreamStats::default()),
        })
    }

    /// Engine counters.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// The shared buffer pool.
    pub fn pool(&self) -> Arc<MemPool> {
        Arc::clone(&self.pool)
    }

    /// Read `read_size` bytes starting at `offset` of the object named by
    /// `location`, streaming them to `writer`.
    ///
    /// Bytes reach the writer in strictly increasing object order. A blob
    /// failure is fatal for the Get: bytes already written stay written,
    /// nothing further is.
    #[instrument(skip(self, writer, location), fields(cluster = %location.cluster_id))]
    pub async fn get<W>(
        &self,
        writer: &mut W,
        location: &Location,
        read_size: u64,
        offset: u64,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        StreamStats::incr(&self.stats.gets_total);
        let res = self.get_inner(writer, location, read_size, offset).await;
        if let Err(e) = &res {
            StreamStats::incr(&self.stats.gets_failed);
            warn!(cluster = %location.cluster_id, error = %e, "get request error");
        }
        res
    }

    async fn get_inner<W>(
        &self,
        writer: &mut W,
        location: &Location,
        read_size: u64,
        offset: u64,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        debug!(size = read_size, offset, "get request");

        let blobs = gen_blob_refs(location, read_size, offset, self.config.max_blob_size)?;
        if blobs.is_empty() {
            return Ok(());
        }

        let cluster_id = location.cluster_id;
        let handles = retry::timed(
            self.config.alloc_retry_times,
            std::time::Duration::from_millis(self.config.alloc_retry_interval_ms),
            || async { self.registry.handles(cluster_id).ok_or(Error::NoCluster(cluster_id)) },
        )
        .await?;

        let fetcher = Arc::new(ShardFetcher {
            client: Arc::clone(&self.client),
            guard: self.guard.clone(),
            service: Arc::clone(&handles.service),
            volumes: Arc::clone(&handles.volumes),
            pool: Arc::clone(&self.pool),
        });

        // try to read data shards only:
        //   small blob: all data sits in the first shard, shards being
        //   floored at min_shard_size;
        //   few bytes: range smaller than a quarter of the blob.
        if blobs.len() == 1 {
            let blob = &blobs[0];
            let tactic = location.code_mode.tactic();
            let sizes = buffer_sizes(blob.blob_size as usize, &tactic)?;
            if blob.blob_size as usize <= sizes.shard_size || blob.read_size < blob.blob_size / 4 {
                debug!(read_size = blob.read_size, blob_size = blob.blob_size,
                    shard_size = sizes.shard_size, "read data shard only");
                match get_data_shards_only(&fetcher, cluster_id, blob, writer).await? {
                    FastRead::Done => {
                        StreamStats::incr(&self.stats.fast_path_reads);
                        return Ok(());
                    }
                    FastRead::NeedReconstruct => {
                        StreamStats::incr(&self.stats.fast_path_fallbacks);
                        info!(vid = %blob.vid, bid = %blob.bid, "read data shard only failed");
                    }
                }
            }
        }

        self.read_blobs(writer, &handles, &fetcher, cluster_id, &blobs)
            .await
    }

    async fn read_blobs<W>(
        &self,
        writer: &mut W,
        handles: &ClusterHandles,
        fetcher: &Arc<ShardFetcher>,
        cluster_id: crate::location::ClusterId,
        blobs: &[BlobRef],
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut routed: Option<(Arc<VolumePhy>, Vec<SortedUnit>)> = None;

        for blob in blobs {
            let stale = match &routed {
                Some((vol, _)) => vol.vid != blob.vid,
                None => true,
            };
            if stale {
                let vol = handles.volumes.get(blob.vid, true).await?;
                let tactic = vol.code_mode.tactic();
                // local repair units never serve reads
                let order =
                    sort_units_by_idc(&handles.service, &self.config.idc, &vol.units[..tactic.read_span()])
                        .await;
                debug!(vid = %blob.vid, order = order.len(),
                    x = self.config.min_read_shards_x, "sorted read order");
                if order.len() < tactic.n {
                    StreamStats::incr(&self.stats.blobs_broken);
                    return Err(Error::BrokenBlob {
                        cluster: cluster_id,
                        vid: blob.vid,
                        bid: blob.bid,
                    });
                }
                routed = Some((vol, order));
            }
            let Some((vol, order)) = &routed else {
                return Err(Error::Internal("volume routing missing".to_string()));
            };

            let tactic = vol.code_mode.tactic();
            let codec = self
                .codecs
                .get(&vol.code_mode)
                .ok_or_else(|| Error::Internal(format!("no codec for {}", vol.code_mode)))?;
            let sizes = buffer_sizes(blob.blob_size as usize, &tactic)?;

            // pre-allocate the full shard matrix
            let mut shards: Vec<Vec<u8>> = Vec::with_capacity(tactic.read_span());
            for _ in 0..tactic.read_span() {
                match self.pool.alloc(sizes.shard_size) {
                    Ok(buf) => shards.push(buf),
                    Err(e) => {
                        release_all(&self.pool, shards);
                        return Err(e);
                    }
                }
            }

            let reader = BlobReader {
                fetcher: Arc::clone(fetcher),
                codec: Arc::clone(codec),
                stats: Arc::clone(&self.stats),
                cluster_id,
                min_read_shards_x: self.config.min_read_shards_x,
            };
            if let Err(e) = reader.read_one_blob(&tactic, blob, order, &mut shards).await {
                release_all(&self.pool, shards);
                return Err(e);
            }

            let write_res = write_blob_range(writer, &shards[..tactic.n], blob).await;
            release_all(&self.pool, shards);
            write_res.map_err(|e| Error::Canceled(format!("write to response ({e})")))?;
            StreamStats::incr(&self.stats.blobs_read);
        }

        Ok(())
    }
}

fn release_all(pool: &MemPool, shards: Vec<Vec<u8>>) {
    for buf in shards {
        pool.put(buf);
    }
}

/// Copy `[offset, offset + read_size)` of a blob to the writer, walking
/// the contiguous data shards.
async fn write_blob_range<W>(
    writer: &mut W,
    data_shards: &[Vec<u8>],
    blob: &BlobRef,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut idx = 0usize;
    let mut off = blob.offset;
    let mut to_read = blob.read_size;
    while to_read > 0 {
        let buf = &data_shards[idx];
        let len = buf.len() as u64;
        if off >= len {
            idx += 1;
            off -= len;
            continue;
        }

        let take = to_read.min(len - off);
        writer
            .write_all(&buf[off as usize..(off + take) as usize])
            .await?;
        idx += 1;
        off = 0;
        to_read -= take;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

//! The speculative read state machine for one blob.
//!
//! Reads start against the `n + x` closest units and escalate one unit
//! at a time while outcomes come back, until either every data shard is
//! present, enough shards exist to reconstruct the missing ones, or the
//! sorted order is exhausted. Outcomes arrive in arbitrary order over one
//! channel; cancellation is cooperative and a detached drain keeps
//! consuming late outcomes so their buffers always reach the pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codemode::Tactic;
use crate::ec::{buffer_sizes, empty_data_shard_indexes, ShardCodec};
use crate::error::{Error, Result};
use crate::location::{BlobRef, ClusterId};
use crate::pool::MemPool;
use crate::stream::shard::{ShardFetcher, ShardOutcome, ShardStatus};
use crate::stream::sorter::SortedUnit;
use crate::stream::stats::StreamStats;

pub(crate) struct BlobReader {
    pub fetcher: Arc<ShardFetcher>,
    pub codec: Arc<dyn ShardCodec>,
    pub stats: Arc<StreamStats>,
    pub cluster_id: ClusterId,
    pub min_read_shards_x: usize,
}

impl BlobReader {
    /// Fill `shards` (the pre-allocated `n + m` matrix) with this blob's
    /// data shards, reconstructing from parity when needed.
    ///
    /// On success the data bytes live contiguously across
    /// `shards[0..n]`; parity buffers may hold anything. On failure the
    /// matrix is intact (all buffers still owned by the caller).
    pub(crate) async fn read_one_blob(
        &self,
        tactic: &Tactic,
        blob: &BlobRef,
        order: &[SortedUnit],
        shards: &mut [Vec<u8>],
    ) -> Result<()> {
        let sizes = buffer_sizes(blob.blob_size as usize, tactic)?;
        let empties: HashSet<usize> = empty_data_shard_indexes(&sizes).into_iter().collect();

        let data_n = tactic.n;
        let read_span = tactic.read_span();
        let shard_size = sizes.shard_size;
        let min_shards_read = (data_n + self.min_read_shards_x).min(order.len());

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<ShardOutcome>(order.len().max(1));

        let mut received: HashMap<usize, bool> = HashMap::with_capacity(read_span);

        // empty padding shards are served as zeros, no network involved
        for &idx in &empties {
            MemPool::zero(&mut shards[idx]);
            let _ = tx.try_send(ShardOutcome {
                index: idx,
                status: ShardStatus::Empty,
            });
        }

        for unit in &order[..min_shards_read] {
            if !empties.contains(&unit.index) {
                self.spawn_read(blob, unit, shard_size, &cancel, &tx);
            }
        }
        let mut next = min_shards_read;
        let mut tx = Some(tx);

        debug!(cluster = %self.cluster_id, vid = %blob.vid, bid = %blob.bid,
            order = order.len(), initial = min_shards_read, data_n, "reading blob");

        let mut reconstructed = false;
        while let Some(outcome) = rx.recv().await {
            match outcome.status {
                ShardStatus::Ok(buf) => {
                    // swap the fetched buffer into the matrix
                    let old = std::mem::replace(&mut shards[outcome.index], buf);
                    self.fetcher.pool.put(old);
                    received.insert(outcome.index, true);
                    StreamStats::incr(&self.stats.shards_ok);
                }
                ShardStatus::Empty => {
                    received.insert(outcome.index, true);
                    StreamStats::incr(&self.stats.shards_empty);
                }
                ShardStatus::Failed => {
                    received.insert(outcome.index, false);
                    StreamStats::incr(&self.stats.shards_failed);
                }
                ShardStatus::Canceled => {
                    received.insert(outcome.index, false);
                    StreamStats::incr(&self.stats.shards_canceled);
                }
            }

            if received.len() < data_n {
                continue;
            }

            let mut bad_idx: Vec<usize> = (0..data_n)
                .filter(|i| !matches!(received.get(i), Some(true)))
                .collect();
            if bad_idx.is_empty() {
                // every data shard present, nothing to reconstruct
                reconstructed = true;
                break;
            }

            for i in data_n..read_span {
                if !matches!(received.get(&i), Some(true)) {
                    bad_idx.push(i);
                }
            }

            let bad_shards = received.values().filter(|ok| !**ok).count();
            if bad_shards > tactic.m {
                info!(cluster = %self.cluster_id, vid = %blob.vid, bid = %blob.bid,
                    bad = bad_shards, "no enough shards to reconstruct");
                break;
            }

            if received.len() >= data_n + bad_shards {
                match self.codec.reconstruct_data(shards, &bad_idx) {
                    Ok(()) => {
                        StreamStats::incr(&self.stats.blobs_reconstructed);
                        reconstructed = true;
                        break;
                    }
                    Err(e) => {
                        // conservative: keep collecting, do not trust
                        // shards that arrive after a decode error
                        info!(cluster = %self.cluster_id, vid = %blob.vid, bid = %blob.bid,
                            error = %e, "ec reconstruct data error");
                    }
                }
            }

            if received.len() >= order.len() {
                break;
            }

            // ask one more unit
            let mut launched = false;
            while next < order.len() {
                let unit = &order[next];
                next += 1;
                if empties.contains(&unit.index) {
                    continue;
                }
                if let Some(tx) = &tx {
                    self.spawn_read(blob, unit, shard_size, &cancel, tx);
                }
                launched = true;
                break;
            }
            if !launched {
                // order exhausted: once in-flight reads report, the
                // channel closes and the loop ends
                tx = None;
            }
        }

        cancel.cancel();
        drop(tx);

        // drain late outcomes so every buffer returns to the pool
        let pool = Arc::clone(&self.fetcher.pool);
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                if let ShardStatus::Ok(buf) = outcome.status {
                    pool.put(buf);
                }
            }
        });

        if reconstructed {
            Ok(())
        } else {
            StreamStats::incr(&self.stats.blobs_broken);
            Err(Error::BrokenBlob {
                cluster: self.cluster_id,
                vid: blob.vid,
                bid: blob.bid,
            })
        }
    }

    fn spawn_read(
        &self,
        blob: &BlobRef,
        unit: &SortedUnit,
        shard_size: usize,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ShardOutcome>,
    ) {
        let fetcher = Arc::clone(&self.fetcher);
        let blob = blob.clone();
        let unit = unit.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = fetcher.read_one_shard(&blob, &unit, shard_size, &cancel).await;
            let _ = tx.send(outcome).await;
        });
    }
}

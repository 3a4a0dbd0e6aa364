//! Property-based tests for shard geometry and reconstruction.

#![cfg(test)]

use proptest::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::codemode::CodeMode;
use crate::ec::codec::{ReedSolomonCodec, ShardCodec};
use crate::ec::geometry::{buffer_sizes, empty_data_shard_indexes};
use crate::location::{gen_blob_refs, Bid, ClusterId, Location, SliceRun, Vid};

fn mode_strategy() -> impl Strategy<Value = CodeMode> {
    prop::sample::select(CodeMode::all().to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The layout always covers the blob and respects the shard floor.
    #[test]
    fn prop_geometry_covers_blob(
        mode in mode_strategy(),
        blob_size in 1usize..1_000_000,
    ) {
        let tactic = mode.tactic();
        let sizes = buffer_sizes(blob_size, &tactic)?;

        prop_assert!(sizes.shard_size >= tactic.min_shard_size);
        prop_assert!(sizes.ec_data_size >= blob_size);
        prop_assert_eq!(sizes.ec_data_size, sizes.shard_size * tactic.n);
        prop_assert_eq!(sizes.ec_size, sizes.shard_size * tactic.total());
        // no more than one shard of slack beyond the floor
        prop_assert!(
            sizes.shard_size == tactic.min_shard_size
                || sizes.ec_data_size < blob_size + tactic.n
        );
    }

    /// Empty indices are exactly the data shards past the blob's bytes.
    #[test]
    fn prop_empty_indexes_consistent(
        mode in mode_strategy(),
        blob_size in 1usize..1_000_000,
    ) {
        let tactic = mode.tactic();
        let sizes = buffer_sizes(blob_size, &tactic)?;
        let empties = empty_data_shard_indexes(&sizes);

        // index 0 always holds data
        prop_assert!(!empties.contains(&0));
        for &idx in &empties {
            prop_assert!(idx < tactic.n);
            // everything at or past this shard is beyond the data
            prop_assert!(idx * sizes.shard_size >= blob_size);
        }
        let live = tactic.n - empties.len();
        prop_assert!(live * sizes.shard_size >= blob_size);
    }

    /// Any loss pattern within m is recoverable and exact.
    #[test]
    fn prop_reconstruct_within_parity_budget(
        seed in any::<u64>(),
        bad in prop::collection::btree_set(0usize..12, 0..=6),
    ) {
        let tactic = CodeMode::EC6P6.tactic();
        let shard_size = 128usize;

        let mut shards: Vec<Vec<u8>> = (0..tactic.read_span())
            .map(|i| {
                (0..shard_size)
                    .map(|j| (seed as usize + i * 131 + j * 7) as u8)
                    .collect()
            })
            .collect();
        for p in shards.iter_mut().skip(tactic.n) {
            p.fill(0);
        }
        let rs = ReedSolomon::new(tactic.n, tactic.m).unwrap();
        rs.encode(&mut shards).unwrap();
        let want: Vec<Vec<u8>> = shards[..tactic.n].to_vec();

        let bad_idx: Vec<usize> = bad.into_iter().collect();
        for &i in &bad_idx {
            shards[i].fill(0xEE);
        }

        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        codec.reconstruct_data(&mut shards, &bad_idx)?;

        for i in 0..tactic.n {
            prop_assert_eq!(&shards[i], &want[i], "data shard {} mismatch", i);
        }
    }

    /// Blob decomposition covers exactly the requested range, in order.
    #[test]
    fn prop_blob_refs_cover_range(
        blob_size in 1u64..100_000,
        blob_count in 1u32..8,
        offset in 0u64..200_000,
        read_size in 0u64..400_000,
    ) {
        let total_size = blob_size * u64::from(blob_count);
        let location = Location {
            cluster_id: ClusterId(1),
            code_mode: CodeMode::EC6P6,
            total_size,
            blob_size: blob_size.min(u64::from(u32::MAX)) as u32,
            slices: vec![SliceRun { vid: Vid(1), min_bid: Bid(1), count: blob_count }],
        };

        let refs = gen_blob_refs(&location, read_size, offset, u32::MAX);
        if offset + read_size > total_size {
            prop_assert!(refs.is_err());
            return Ok(());
        }
        let refs = refs.unwrap();

        prop_assert_eq!(refs.iter().map(|b| b.read_size).sum::<u64>(), read_size);
        if let Some(first) = refs.first() {
            prop_assert_eq!(first.offset, offset % blob_size);
        }
        for b in &refs {
            prop_assert!(b.read_size > 0);
            prop_assert!(b.offset + b.read_size <= b.blob_size);
            prop_assert!(b.blob_size <= blob_size);
        }
        // consecutive bids, later blobs start at offset zero
        for pair in refs.windows(2) {
            prop_assert_eq!(pair[1].bid.0, pair[0].bid.0 + 1);
            prop_assert_eq!(pair[1].offset, 0);
        }
    }
}

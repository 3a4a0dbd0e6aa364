//! Identifiers, locations and the location → blob range math.
//!
//! A [`Location`] names where an object's bytes live: an ordered list of
//! blob runs inside volumes of one cluster. [`gen_blob_refs`] turns a
//! `(location, read_size, offset)` triple into the per-blob read plan the
//! rest of the engine consumes.

use serde::{Deserialize, Serialize};

use crate::codemode::CodeMode;
use crate::error::{Error, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Cluster identifier (value object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

/// Volume identifier (value object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vid(pub u32);

/// Blob identifier, unique inside a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bid(pub u64);

/// Disk identifier, unique inside a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskId(pub u32);

/// Volume unit identifier.
///
/// Packs `(vid, unit index, epoch)` into one integer: the epoch advances
/// whenever the unit is rebuilt onto another disk, so a vuid names one
/// physical chunk, not just a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vuid(pub u64);

impl Vuid {
    const INDEX_BITS: u32 = 8;
    const EPOCH_BITS: u32 = 24;

    /// Build a vuid from its parts.
    pub fn new(vid: Vid, index: u8, epoch: u32) -> Self {
        let epoch = u64::from(epoch) & ((1 << Self::EPOCH_BITS) - 1);
        Vuid((u64::from(vid.0) << (Self::INDEX_BITS + Self::EPOCH_BITS))
            | (u64::from(index) << Self::EPOCH_BITS)
            | epoch)
    }

    /// Volume this unit belongs to.
    pub fn vid(&self) -> Vid {
        Vid((self.0 >> (Self::INDEX_BITS + Self::EPOCH_BITS)) as u32)
    }

    /// Slot index within the volume.
    pub fn index(&self) -> usize {
        ((self.0 >> Self::EPOCH_BITS) & 0xff) as usize
    }

    /// Rebuild epoch of the unit.
    pub fn epoch(&self) -> u32 {
        (self.0 & ((1 << Self::EPOCH_BITS) - 1)) as u32
    }
}

macro_rules! impl_display {
    ($($t:ty),*) => {$(
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )*};
}
impl_display!(ClusterId, Vid, Bid, DiskId, Vuid);

// =============================================================================
// Location
// =============================================================================

/// A run of consecutive blob ids inside one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRun {
    pub vid: Vid,
    pub min_bid: Bid,
    pub count: u32,
}

/// Where an object's bytes live.
///
/// Immutable for the duration of a Get. `total_size` is the object size;
/// every blob except possibly the last one holds exactly `blob_size`
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub cluster_id: ClusterId,
    pub code_mode: CodeMode,
    pub total_size: u64,
    pub blob_size: u32,
    pub slices: Vec<SliceRun>,
}

/// One blob's slice of a Get, derived from the location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub vid: Vid,
    pub bid: Bid,
    /// Actual size of this blob (the last blob may be short)
    pub blob_size: u64,
    /// Read offset within the blob
    pub offset: u64,
    /// Bytes to read from this blob
    pub read_size: u64,
}

/// Decompose a read range into per-blob references.
///
/// Validates `offset + read_size <= total_size` and the blob size bounds,
/// then walks the slice runs producing one [`BlobRef`] per touched blob.
/// An empty result means there is nothing to read.
pub fn gen_blob_refs(
    location: &Location,
    read_size: u64,
    offset: u64,
    max_blob_size: u32,
) -> Result<Vec<BlobRef>> {
    if offset.checked_add(read_size).is_none() || offset + read_size > location.total_size {
        return Err(Error::IllegalArgument(format!(
            "total_size:{} read_size:{} offset:{}",
            location.total_size, read_size, offset
        )));
    }
    if location.blob_size == 0 || location.blob_size > max_blob_size {
        return Err(Error::IllegalArgument(format!(
            "blob_size:{}",
            location.blob_size
        )));
    }

    let blob_size = u64::from(location.blob_size);
    let mut remain = read_size;
    let first_blob_idx = offset / blob_size;
    let mut blob_offset = offset % blob_size;

    let mut idx = 0u64;
    let mut blobs = Vec::with_capacity((1 + (read_size + blob_offset) / blob_size) as usize);
    for run in &location.slices {
        let mut bid = run.min_bid;

        for _ in 0..run.count {
            if remain == 0 {
                return Ok(blobs);
            }

            if idx >= first_blob_idx {
                let to_read = remain.min(blob_size - blob_offset);
                if to_read > 0 {
                    blobs.push(BlobRef {
                        vid: run.vid,
                        bid,
                        // the last blob may hold fewer bytes than blob_size
                        blob_size: blob_size.min(location.total_size - idx * blob_size),
                        offset: blob_offset,
                        read_size: to_read,
                    });
                }

                blob_offset = 0;
                remain -= to_read;
            }

            bid = Bid(bid.0 + 1);
            idx += 1;
        }
    }

    if remain > 0 {
        return Err(Error::IllegalArgument(format!(
            "no enough data to read {remain}"
        )));
    }

    Ok(blobs)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_BLOB: u32 = 1 << 22;

    fn location(total_size: u64, blob_size: u32, runs: &[(u32, u64, u32)]) -> Location {
        Location {
            cluster_id: ClusterId(1),
            code_mode: CodeMode::EC6P6,
            total_size,
            blob_size,
            slices: runs
                .iter()
                .map(|&(vid, min_bid, count)| SliceRun {
                    vid: Vid(vid),
                    min_bid: Bid(min_bid),
                    count,
                })
                .collect(),
        }
    }

    #[test]
    fn test_vuid_packing() {
        let vuid = Vuid::new(Vid(42), 7, 3);
        assert_eq!(vuid.vid(), Vid(42));
        assert_eq!(vuid.index(), 7);
        assert_eq!(vuid.epoch(), 3);
    }

    #[test]
    fn test_single_blob_full_read() {
        let loc = location(4096, 4096, &[(1, 100, 1)]);
        let blobs = gen_blob_refs(&loc, 4096, 0, MAX_BLOB).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].bid, Bid(100));
        assert_eq!(blobs[0].blob_size, 4096);
        assert_eq!(blobs[0].offset, 0);
        assert_eq!(blobs[0].read_size, 4096);
    }

    #[test]
    fn test_offset_straddles_blobs() {
        let loc = location(8192, 4096, &[(1, 100, 2)]);
        let blobs = gen_blob_refs(&loc, 4096, 2048, MAX_BLOB).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].bid, Bid(100));
        assert_eq!(blobs[0].offset, 2048);
        assert_eq!(blobs[0].read_size, 2048);
        assert_eq!(blobs[1].bid, Bid(101));
        assert_eq!(blobs[1].offset, 0);
        assert_eq!(blobs[1].read_size, 2048);
    }

    #[test]
    fn test_short_last_blob() {
        let loc = location(6000, 4096, &[(1, 100, 2)]);
        let blobs = gen_blob_refs(&loc, 6000, 0, MAX_BLOB).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].blob_size, 4096);
        assert_eq!(blobs[1].blob_size, 6000 - 4096);
        assert_eq!(blobs[1].read_size, 6000 - 4096);
    }

    #[test]
    fn test_skips_leading_blobs() {
        let loc = location(3 * 4096, 4096, &[(1, 100, 3)]);
        let blobs = gen_blob_refs(&loc, 100, 2 * 4096 + 50, MAX_BLOB).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].bid, Bid(102));
        assert_eq!(blobs[0].offset, 50);
        assert_eq!(blobs[0].read_size, 100);
    }

    #[test]
    fn test_spans_runs() {
        let loc = location(2 * 4096, 4096, &[(1, 100, 1), (2, 500, 1)]);
        let blobs = gen_blob_refs(&loc, 2 * 4096, 0, MAX_BLOB).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].vid, Vid(1));
        assert_eq!(blobs[1].vid, Vid(2));
        assert_eq!(blobs[1].bid, Bid(500));
    }

    #[test]
    fn test_zero_read_is_empty() {
        let loc = location(4096, 4096, &[(1, 100, 1)]);
        let blobs = gen_blob_refs(&loc, 0, 0, MAX_BLOB).unwrap();
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_range_out_of_bounds() {
        let loc = location(4096, 4096, &[(1, 100, 1)]);
        assert!(matches!(
            gen_blob_refs(&loc, 4096, 1, MAX_BLOB),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_rejects_bad_blob_size() {
        let loc = location(4096, 0, &[(1, 100, 1)]);
        assert!(gen_blob_refs(&loc, 1, 0, MAX_BLOB).is_err());

        let loc = location(4096, MAX_BLOB * 2, &[(1, 100, 1)]);
        assert!(gen_blob_refs(&loc, 1, 0, MAX_BLOB).is_err());
    }

    #[test]
    fn test_runs_shorter_than_range() {
        // location claims 2 blobs of data but carries only one run of 1
        let loc = location(2 * 4096, 4096, &[(1, 100, 1)]);
        assert!(matches!(
            gen_blob_refs(&loc, 2 * 4096, 0, MAX_BLOB),
            Err(Error::IllegalArgument(_))
        ));
    }
}

//! Shard geometry derived from blob size and code tactic.
//!
//! Mirrors the writer's layout rule so the reader agrees with what the
//! put path stored: every shard of a blob has the same size, shards are
//! floored at the tactic's `min_shard_size`, and data beyond
//! `ceil(data_size / shard_size)` shards is pure zero padding that was
//! never written anywhere.

use crate::codemode::Tactic;
use crate::error::{Error, Result};

/// Buffer layout of one blob under a given tactic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    /// Size of every shard, data and parity alike
    pub shard_size: usize,
    /// Logical bytes of the blob
    pub data_size: usize,
    /// Bytes covered by the n data shards (`shard_size * n`)
    pub ec_data_size: usize,
    /// Bytes covered by all shards (`shard_size * (n + m + l)`)
    pub ec_size: usize,
}

/// Compute the shard layout the writer used for `blob_size` bytes.
pub fn buffer_sizes(blob_size: usize, tactic: &Tactic) -> Result<BufferSizes> {
    if blob_size == 0 {
        return Err(Error::IllegalArgument("blob_size:0".to_string()));
    }

    let shard_size = blob_size.div_ceil(tactic.n).max(tactic.min_shard_size);
    Ok(BufferSizes {
        shard_size,
        data_size: blob_size,
        ec_data_size: shard_size * tactic.n,
        ec_size: shard_size * tactic.total(),
    })
}

/// Data shard indices that hold only zero padding.
///
/// These shards are never fetched; the reader zero-fills their buffers
/// and marks them received up front.
pub fn empty_data_shard_indexes(sizes: &BufferSizes) -> Vec<usize> {
    let first_empty = sizes.data_size.div_ceil(sizes.shard_size);
    let n = sizes.ec_data_size / sizes.shard_size;
    (first_empty..n).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemode::CodeMode;

    #[test]
    fn test_even_split_has_no_empties() {
        let tactic = CodeMode::EC6P6.tactic();
        let sizes = buffer_sizes(6 * 4096, &tactic).unwrap();
        assert_eq!(sizes.shard_size, 4096);
        assert_eq!(sizes.ec_data_size, 6 * 4096);
        assert_eq!(sizes.ec_size, 12 * 4096);
        assert!(empty_data_shard_indexes(&sizes).is_empty());
    }

    #[test]
    fn test_min_shard_size_floor() {
        let tactic = CodeMode::EC6P6.tactic();
        // tiny blob: one 2 KiB shard holds it all, the rest is padding
        let sizes = buffer_sizes(100, &tactic).unwrap();
        assert_eq!(sizes.shard_size, tactic.min_shard_size);
        assert_eq!(empty_data_shard_indexes(&sizes), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_partial_tail_shard_not_empty() {
        let tactic = CodeMode::EC6P6.tactic();
        // 2.5 shards of data: indices 3..6 are padding
        let sizes = buffer_sizes(5 * 2048 / 2, &tactic).unwrap();
        assert_eq!(sizes.shard_size, tactic.min_shard_size);
        assert_eq!(empty_data_shard_indexes(&sizes), vec![3, 4, 5]);
    }

    #[test]
    fn test_uneven_split_rounds_up() {
        let tactic = CodeMode::EC6P6.tactic();
        let sizes = buffer_sizes(6 * 4096 + 1, &tactic).unwrap();
        assert_eq!(sizes.shard_size, 4097);
        assert!(empty_data_shard_indexes(&sizes).is_empty());
    }

    #[test]
    fn test_zero_blob_rejected() {
        let tactic = CodeMode::EC6P6.tactic();
        assert!(buffer_sizes(0, &tactic).is_err());
    }
}

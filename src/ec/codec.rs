//! Reconstruction codec over the shard matrix.
//!
//! The engine owns its shard buffers (they come from the pool), so the
//! codec reconstructs in place: callers hand over all `n + m` buffers
//! plus the indices known to be bad, and the bad buffers are rewritten
//! with recovered bytes without any reallocation.

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::codemode::Tactic;
use crate::error::{Error, Result};

/// Erasure code mathematics, as the read path sees it.
///
/// Implementations must recover every data shard listed in `bad_idx`
/// (parity indices in `bad_idx` only mark shards unavailable as input).
pub trait ShardCodec: Send + Sync {
    /// Reconstruct missing data shards in place.
    ///
    /// `shards` holds the `n + m` equally sized buffers of one blob;
    /// `bad_idx` lists the indices whose content is unusable.
    fn reconstruct_data(&self, shards: &mut [Vec<u8>], bad_idx: &[usize]) -> Result<()>;
}

/// Reed-Solomon codec over GF(2^8).
pub struct ReedSolomonCodec {
    rs: ReedSolomon,
    n: usize,
    m: usize,
}

impl ReedSolomonCodec {
    /// Build a codec for one tactic.
    pub fn new(tactic: &Tactic) -> Result<Self> {
        let rs = ReedSolomon::new(tactic.n, tactic.m)
            .map_err(|e| Error::Internal(format!("reed-solomon init ({e})")))?;
        Ok(Self {
            rs,
            n: tactic.n,
            m: tactic.m,
        })
    }
}

impl ShardCodec for ReedSolomonCodec {
    fn reconstruct_data(&self, shards: &mut [Vec<u8>], bad_idx: &[usize]) -> Result<()> {
        let span = self.n + self.m;
        if shards.len() != span {
            return Err(Error::Internal(format!(
                "shard matrix len {} != {}",
                shards.len(),
                span
            )));
        }

        // move buffers into (buf, present) pairs so reconstruction writes
        // straight into the pooled allocations
        let mut slots: Vec<(Vec<u8>, bool)> = shards
            .iter_mut()
            .enumerate()
            .map(|(i, buf)| (std::mem::take(buf), !bad_idx.contains(&i)))
            .collect();

        let res = self
            .rs
            .reconstruct_data(&mut slots)
            .map_err(|e| Error::Internal(format!("reed-solomon reconstruct ({e})")));

        for (slot, buf) in slots.into_iter().zip(shards.iter_mut()) {
            *buf = slot.0;
        }

        res
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codemode::CodeMode;

    fn encoded_matrix(tactic: &Tactic, shard_size: usize) -> Vec<Vec<u8>> {
        let mut shards: Vec<Vec<u8>> = (0..tactic.read_span())
            .map(|i| {
                if i < tactic.n {
                    (0..shard_size).map(|j| (i * 31 + j) as u8).collect()
                } else {
                    vec![0u8; shard_size]
                }
            })
            .collect();
        let rs = ReedSolomon::new(tactic.n, tactic.m).unwrap();
        rs.encode(&mut shards).unwrap();
        shards
    }

    #[test]
    fn test_reconstruct_two_data_shards() {
        let tactic = CodeMode::EC6P6.tactic();
        let shards = encoded_matrix(&tactic, 64);
        let want2 = shards[2].clone();
        let want5 = shards[5].clone();

        let mut broken = shards.clone();
        broken[2].fill(0);
        broken[5].fill(0);

        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        codec.reconstruct_data(&mut broken, &[2, 5]).unwrap();

        assert_eq!(broken[2], want2);
        assert_eq!(broken[5], want5);
    }

    #[test]
    fn test_reconstruct_with_bad_parity_marked() {
        let tactic = CodeMode::EC6P6.tactic();
        let shards = encoded_matrix(&tactic, 64);
        let want0 = shards[0].clone();

        let mut broken = shards.clone();
        broken[0].fill(0);
        broken[7].fill(0);

        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        codec.reconstruct_data(&mut broken, &[0, 7]).unwrap();
        assert_eq!(broken[0], want0);
    }

    #[test]
    fn test_too_many_bad_fails() {
        let tactic = CodeMode::EC6P6.tactic();
        let mut shards = encoded_matrix(&tactic, 64);
        let bad: Vec<usize> = (0..7).collect();
        for &i in &bad {
            shards[i].fill(0);
        }

        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        assert!(codec.reconstruct_data(&mut shards, &bad).is_err());
    }

    #[test]
    fn test_buffers_keep_allocation() {
        let tactic = CodeMode::EC6P6.tactic();
        let mut shards = encoded_matrix(&tactic, 64);
        let ptrs: Vec<*const u8> = shards.iter().map(|s| s.as_ptr()).collect();

        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        codec.reconstruct_data(&mut shards, &[1]).unwrap();

        for (shard, ptr) in shards.iter().zip(ptrs) {
            assert_eq!(shard.as_ptr(), ptr);
        }
    }

    #[test]
    fn test_wrong_matrix_size() {
        let tactic = CodeMode::EC6P6.tactic();
        let codec = ReedSolomonCodec::new(&tactic).unwrap();
        let mut shards = vec![vec![0u8; 8]; 3];
        assert!(codec.reconstruct_data(&mut shards, &[]).is_err());
    }
}

//! Erasure code modes and their tactics.
//!
//! A code mode fixes the shape of a volume: `n` data units, `m` parity
//! units and `l` local-repair units spread over `az_count` failure
//! domains. The read path only ever touches the first `n + m` units;
//! local units exist for repair traffic and are skipped here.

use serde::{Deserialize, Serialize};

/// Supported erasure code modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeMode {
    /// 6 data + 6 parity, three failure domains
    EC6P6,
    /// 6 data + 10 parity + 2 local, two failure domains
    EC6P10L2,
    /// 15 data + 12 parity, three failure domains
    EC15P12,
    /// 16 data + 20 parity + 2 local, two failure domains
    EC16P20L2,
}

/// Parameters of one erasure code mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tactic {
    /// Number of data shards
    pub n: usize,
    /// Number of parity shards
    pub m: usize,
    /// Number of local-repair shards (not used for reads)
    pub l: usize,
    /// Failure domains the volume spans
    pub az_count: usize,
    /// Write quorum of the put path
    pub put_quorum: usize,
    /// Writer-side shard alignment floor in bytes
    pub min_shard_size: usize,
}

impl Tactic {
    /// Total units in a volume of this mode.
    pub fn total(&self) -> usize {
        self.n + self.m + self.l
    }

    /// Units that participate in read reconstruction.
    pub fn read_span(&self) -> usize {
        self.n + self.m
    }
}

const MIN_SHARD_SIZE: usize = 2048;

impl CodeMode {
    /// All modes the engine builds codecs for.
    pub fn all() -> &'static [CodeMode] {
        &[
            CodeMode::EC6P6,
            CodeMode::EC6P10L2,
            CodeMode::EC15P12,
            CodeMode::EC16P20L2,
        ]
    }

    /// The tactic of this mode.
    pub fn tactic(&self) -> Tactic {
        match self {
            CodeMode::EC6P6 => Tactic {
                n: 6,
                m: 6,
                l: 0,
                az_count: 3,
                put_quorum: 11,
                min_shard_size: MIN_SHARD_SIZE,
            },
            CodeMode::EC6P10L2 => Tactic {
                n: 6,
                m: 10,
                l: 2,
                az_count: 2,
                put_quorum: 14,
                min_shard_size: MIN_SHARD_SIZE,
            },
            CodeMode::EC15P12 => Tactic {
                n: 15,
                m: 12,
                l: 0,
                az_count: 3,
                put_quorum: 24,
                min_shard_size: MIN_SHARD_SIZE,
            },
            CodeMode::EC16P20L2 => Tactic {
                n: 16,
                m: 20,
                l: 2,
                az_count: 2,
                put_quorum: 34,
                min_shard_size: MIN_SHARD_SIZE,
            },
        }
    }

    /// Human readable mode name.
    pub fn name(&self) -> &'static str {
        match self {
            CodeMode::EC6P6 => "EC6P6",
            CodeMode::EC6P10L2 => "EC6P10L2",
            CodeMode::EC15P12 => "EC15P12",
            CodeMode::EC16P20L2 => "EC16P20L2",
        }
    }
}

impl std::fmt::Display for CodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

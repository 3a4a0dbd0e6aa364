//! Erasure coding: shard geometry and the reconstruction codec.

pub mod codec;
pub mod geometry;

#[cfg(test)]
mod proptest;

pub use codec::{ReedSolomonCodec, ShardCodec};
pub use geometry::{buffer_sizes, empty_data_shard_indexes, BufferSizes};

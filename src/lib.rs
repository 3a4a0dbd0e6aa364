//! shardstream - read engine of an erasure-coded blob store
//!
//! Given a logical location (a sequence of blobs, each striped across
//! `n` data + `m` parity units in multiple failure domains), the engine
//! returns the requested byte range with minimum latency and over-read:
//! it sorts placements by locality and health, fans out speculative
//! shard reads, escalates one unit at a time, reconstructs missing data
//! from parity once enough shards exist, punishes faulty disks locally
//! and refreshes stale volume routing on identity mismatches.
//!
//! # Architecture
//!
//! ```text
//! Get Pipeline ──► Volume Resolver ──► Locality Sorter
//!      │
//!      ▼
//! Blob Reader ──fan-out──► Shard Reader ──► Shard Transport
//!      ▲                        │
//!      └── reconstruct ◄── punish / refresh
//! ```
//!
//! The storage node client, the cluster directory and the volume source
//! are injected behind traits; this crate owns the read policy, not the
//! wire.
//!
//! # Modules
//!
//! - [`codemode`] - Erasure code modes and tactics
//! - [`config`] - Engine configuration
//! - [`controller`] - Disk host and volume layout caches
//! - [`ec`] - Shard geometry and the reconstruction codec
//! - [`error`] - Error types
//! - [`location`] - Identifiers and range math
//! - [`pool`] - Shard buffer pool
//! - [`stream`] - The Get pipeline itself
//! - [`transport`] - Typed storage node interface

pub mod codemode;
pub mod config;
pub mod controller;
pub mod ec;
pub mod error;
pub mod location;
pub mod pool;
mod retry;
pub mod stream;
pub mod transport;

pub use codemode::{CodeMode, Tactic};
pub use config::StreamConfig;
pub use controller::{ClusterRegistry, ServiceController, ServiceDirectory, VolumeGetter, VolumeSource};
pub use error::{Error, Result};
pub use location::{Bid, ClusterId, DiskId, Location, SliceRun, Vid, Vuid};
pub use pool::MemPool;
pub use stream::{Handler, StreamStats, StreamStatsSnapshot};
pub use transport::{RangeGetArgs, ShardError, ShardPayload, StorageNodeClient};

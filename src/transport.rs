//! Shard transport: the typed interface to storage nodes.
//!
//! One call fetches one byte range of one shard. Errors come back
//! classified so the layers above can decide between punishing the disk,
//! refreshing stale routing, or simply asking another unit. The policy
//! split matters: `Overload`, `DiskBroken`, `VuidReadonly` and `Timeout`
//! are re-route signals that must not be retried against the same target.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

use crate::location::{Bid, DiskId, Vuid};

/// Arguments of one shard range read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeGetArgs {
    pub disk_id: DiskId,
    pub vuid: Vuid,
    pub bid: Bid,
    pub offset: u64,
    pub size: u64,
}

/// Bytes of a shard range plus the crc32 (IEEE) the node computed.
#[derive(Debug, Clone)]
pub struct ShardPayload {
    pub body: Bytes,
    pub crc: u32,
}

/// Classified shard transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    /// Server-declared backpressure
    #[error("storage node overloaded")]
    Overload,

    /// The disk reported an unrecoverable I/O state
    #[error("disk broken")]
    DiskBroken,

    /// The chunk was switched readonly under repair
    #[error("vuid readonly")]
    VuidReadonly,

    /// The node does not own this disk (stale routing)
    #[error("disk not found")]
    DiskNotFound,

    /// The node does not hold this vuid (stale routing)
    #[error("vuid not found")]
    VuidNotFound,

    /// Deadline exceeded on the network or the node
    #[error("shard request timeout")]
    Timeout,

    /// The read was canceled cooperatively
    #[error("canceled read shard")]
    Canceled,

    /// Transient, retryable failure
    #[error("shard transport: {0}")]
    Other(String),
}

impl ShardError {
    /// Errors whose answer is re-route, not retry against the same target.
    pub fn is_short_circuit(&self) -> bool {
        matches!(
            self,
            ShardError::Overload
                | ShardError::DiskBroken
                | ShardError::VuidReadonly
                | ShardError::Timeout
                | ShardError::Canceled
        )
    }

    /// Stale-routing signals that warrant a volume cache refresh.
    pub fn is_identity_mismatch(&self) -> bool {
        matches!(self, ShardError::DiskNotFound | ShardError::VuidNotFound)
    }

    /// Hard disk errors that warrant a full punish.
    pub fn is_disk_fault(&self) -> bool {
        matches!(self, ShardError::DiskBroken | ShardError::VuidReadonly)
    }
}

/// Injected storage node client.
///
/// The caller receives exactly `args.size` bytes; a short body must be
/// reported as an error by the implementation or it will be rejected as
/// corrupt upstream.
#[async_trait]
pub trait StorageNodeClient: Send + Sync {
    async fn range_get(
        &self,
        host: &str,
        args: &RangeGetArgs,
    ) -> std::result::Result<ShardPayload, ShardError>;
}

/// Concurrency and deadline guard around shard reads.
///
/// Every in-flight shard read holds one permit and runs under its own
/// deadline, bounding both the fan-out across all concurrent Gets and
/// the worst-case wait on a silent node.
#[derive(Clone)]
pub struct CommandGuard {
    permits: Arc<Semaphore>,
    deadline: Duration,
}

impl CommandGuard {
    pub fn new(max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            deadline,
        }
    }

    /// Run one transport call under the guard.
    pub async fn run<F>(&self, fut: F) -> std::result::Result<ShardPayload, ShardError>
    where
        F: std::future::Future<Output = std::result::Result<ShardPayload, ShardError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ShardError::Canceled)?;
        match timeout(self.deadline, fut).await {
            Ok(res) => res,
            Err(_) => Err(ShardError::Timeout),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

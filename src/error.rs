//! Error types for the read engine.

use thiserror::Error;

use crate::location::{Bid, ClusterId, Vid};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that a Get surfaces to the caller.
///
/// Transport-level failures (overload, broken disks, stale routing,
/// timeouts) are recovered inside the engine by punishing, re-routing or
/// reconstructing and never show up here directly; only the blob-level
/// verdict does.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed location or a read range outside the object
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// No routing entry for the requested cluster
    #[error("no such cluster: {0}")]
    NoCluster(ClusterId),

    /// Not enough live shards to reconstruct the blob
    #[error("broken blob ({cluster} {vid} {bid})")]
    BrokenBlob {
        cluster: ClusterId,
        vid: Vid,
        bid: Bid,
    },

    /// The caller's writer failed or the Get was canceled externally
    #[error("get canceled: {0}")]
    Canceled(String),

    /// Allocation failure, or an encoder failure on fully-received input
    #[error("internal error: {0}")]
    Internal(String),
}

//! The contract hotpin consumes from a content-addressed storage node.
//!
//! Storage, block exchange, routing and naming all live behind [`Node`].
//! The node owns the pin set and is responsible for its own concurrency
//! safety; callers hold no locks around these calls.

use crate::cid::{Cid, ContentPath};
use crate::error::NodeError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result type for node calls.
pub type NodeResult<T> = std::result::Result<T, NodeError>;

/// A lazy, finite listing of pins. Each call to [`Node::list_pins`] lists afresh.
pub type PinStream = BoxStream<'static, NodeResult<PinEntry>>;

/// How a CID is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    /// Only the named object is retained.
    Direct,
    /// The object and everything it references is retained.
    Recursive,
    /// Retained because some recursive pin references it.
    Indirect,
}

impl PinMode {
    pub fn is_recursive(self) -> bool {
        matches!(self, PinMode::Recursive)
    }

    /// Whether this mode retains the object on its own account.
    pub fn is_explicit(self) -> bool {
        !matches!(self, PinMode::Indirect)
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinMode::Direct => f.write_str("direct"),
            PinMode::Recursive => f.write_str("recursive"),
            PinMode::Indirect => f.write_str("indirect"),
        }
    }
}

impl FromStr for PinMode {
    type Err = NodeError;

    /// Accepts the node's type labels, including `indirect through <cid>`.
    fn from_str(s: &str) -> NodeResult<Self> {
        match s {
            "direct" => Ok(PinMode::Direct),
            "recursive" => Ok(PinMode::Recursive),
            s if s.starts_with("indirect") => Ok(PinMode::Indirect),
            other => Err(NodeError::Malformed(format!("unknown pin type {:?}", other))),
        }
    }
}

/// One entry of a pin listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinEntry {
    pub cid: Cid,
    pub mode: PinMode,
}

impl PinEntry {
    pub fn new(cid: Cid, mode: PinMode) -> Self {
        Self { cid, mode }
    }
}

/// Swarm-level statistics, logged alongside each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmStats {
    pub peers: usize,
    pub total_in: u64,
    pub total_out: u64,
}

/// A content-addressed storage node.
#[async_trait]
pub trait Node: Send + Sync {
    /// Look up a naming-system pointer, yielding the content path it is bound to.
    async fn resolve_name(&self, pointer: &str) -> NodeResult<ContentPath>;

    /// Dereference a content path to the CID of the object it names.
    async fn stat_path(&self, path: &ContentPath) -> NodeResult<Cid>;

    /// List current pins: recursive pins when `recursive`, direct pins otherwise.
    async fn list_pins(&self, recursive: bool) -> NodeResult<PinStream>;

    /// How `cid` is pinned, if at all.
    async fn is_pinned(&self, cid: &Cid) -> NodeResult<Option<PinMode>>;

    /// Pin the object at `path`.
    async fn pin(&self, path: &ContentPath, recursive: bool) -> NodeResult<()>;

    /// Remove a pin. Fails with [`NodeError::NotPinned`] when there is none.
    async fn unpin(&self, cid: &Cid, recursive: bool) -> NodeResult<()>;

    /// All directly pinned CIDs.
    async fn direct_keys(&self) -> NodeResult<Vec<Cid>>;

    /// Peer count and bandwidth totals.
    async fn swarm_stats(&self) -> NodeResult<SwarmStats> {
        Err(NodeError::Unsupported("swarm stats"))
    }
}

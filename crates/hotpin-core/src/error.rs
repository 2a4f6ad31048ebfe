//! Error types for hotpin-core.

use crate::cid::{Cid, HotPointer};
use std::fmt;
use thiserror::Error;

/// Result type for hotpin-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hotpin-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The ownership ledger could not be read or written
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid reconciler configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors reported by a [`Node`](crate::node::Node) implementation.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node (or the naming system behind it) could not be reached.
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The requested name or path is not bound to anything.
    #[error("not found: {0}")]
    NotFound(String),

    /// An unpin targeted a CID that is not pinned.
    #[error("{0} is not pinned")]
    NotPinned(Cid),

    /// The node answered with an error.
    #[error("node rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The node answered with something we could not interpret.
    #[error("malformed node response: {0}")]
    Malformed(String),

    /// The node does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Which half of the two-stage resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    /// Naming-system lookup (pointer -> content path).
    Name,
    /// Path dereference (content path -> root CID).
    Stat,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveStage::Name => f.write_str("name"),
            ResolveStage::Stat => f.write_str("stat"),
        }
    }
}

/// The hot pointer could not be turned into a CID. Always transient.
#[derive(Debug, Error)]
#[error("failed to resolve {pointer} at {stage} stage: {source}")]
pub struct ResolutionError {
    pub pointer: HotPointer,
    pub stage: ResolveStage,
    #[source]
    pub source: NodeError,
}

/// Pin store operations, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    List,
    IsPinned,
    DirectKeys,
    Pin,
    Unpin,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::List => "list",
            StoreOp::IsPinned => "is-pinned",
            StoreOp::DirectKeys => "direct-keys",
            StoreOp::Pin => "pin",
            StoreOp::Unpin => "unpin",
        };
        f.write_str(name)
    }
}

/// A pin store call failed. Transient; retried on the next tick.
#[derive(Debug, Error)]
#[error("{op} {target} failed: {source}")]
pub struct PinStoreError {
    pub op: StoreOp,
    pub target: String,
    #[source]
    pub source: NodeError,
}

impl PinStoreError {
    pub fn new(op: StoreOp, target: impl fmt::Display, source: NodeError) -> Self {
        Self {
            op,
            target: target.to_string(),
            source,
        }
    }
}

//! Hotpin Node - Hot-Data Pin Daemon
//!
//! Runs the hotpin reconciler against a Kubo-compatible node, keeping the
//! node's pin set on whatever dataset the hot pointer names.
//!
//! # Architecture
//!
//! - **Kubo**: RPC client implementing the reconciler's `Node` contract
//! - **Storage**: RocksDB-backed ownership ledger
//! - **Node**: environment configuration, startup and signal handling
//!
//! # Example
//!
//! ```no_run
//! use hotpin_node::{HotpinConfig, HotpinNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HotpinConfig::from_env()?;
//!     let node = HotpinNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod kubo;
pub mod node;
pub mod storage;

pub use error::{Error, Result};
pub use kubo::KuboNode;
pub use node::{HotpinConfig, HotpinNode, DEFAULT_POINTER};
pub use storage::Storage;

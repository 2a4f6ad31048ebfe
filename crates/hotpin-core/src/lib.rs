//! Hotpin Core - Hot-Data Pin Reconciliation
//!
//! Keeps a content-addressed node's pin set in step with a single
//! externally published "current hot dataset" pointer. At most one hot
//! dataset placed by the loop is retained at any time, and transient
//! naming-system or pin-store failures never stop the loop.
//!
//! # Architecture
//!
//! - **Node**: the storage node contract (naming, stat, pins)
//! - **Resolver**: pointer -> content path -> CID, fresh every tick
//! - **Strategy**: recursive sweep or direct slot
//! - **Ledger**: which pins the loop itself placed
//! - **Reconciler**: the tick body and the loop around it
//! - **Schedule**: tick sources and shutdown
//!
//! # Example
//!
//! ```no_run
//! use hotpin_core::{HotPointer, MemoryLedger, MemoryNode, Reconciler, ReconcilerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pointer = HotPointer::new("/ipns/mirrors.example.org/.hotdata")?;
//!     let config = ReconcilerConfig::new(pointer);
//!     let reconciler = Reconciler::new(
//!         Arc::new(MemoryNode::new()),
//!         Arc::new(MemoryLedger::new()),
//!         config,
//!     )?;
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let handle = reconciler.spawn(shutdown_rx);
//!     tokio::signal::ctrl_c().await?;
//!     shutdown_tx.send(true)?;
//!     handle.await?;
//!     Ok(())
//! }
//! ```

pub mod cid;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod node;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod schedule;
pub mod strategy;

pub use cid::{Cid, ContentPath, HotPointer};
pub use error::{Error, NodeError, PinStoreError, ResolutionError, ResolveStage, Result, StoreOp};
pub use ledger::{MemoryLedger, OwnedPin, PinLedger};
pub use memory::{MemoryNode, NodeCall};
pub use node::{Node, NodeResult, PinEntry, PinMode, PinStream, SwarmStats};
pub use reconciler::{Reconciler, ReconcilerConfig, DEFAULT_INTERVAL};
pub use report::{ActionResult, PinAction, PinOp, TickKind, TickOutcome, TickReport};
pub use resolver::NameResolver;
pub use schedule::{IntervalTicker, ManualTicker, ManualTrigger, TickSource};
pub use strategy::{OwnershipScope, PinStrategy};

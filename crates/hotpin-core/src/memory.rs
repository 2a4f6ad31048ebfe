//! In-process [`Node`] and its knobs.
//!
//! `MemoryNode` keeps a naming table and a pin set in memory, records every
//! call it receives, and can be told to fail in the ways a real node fails.
//! It backs the reconciler tests and is handy for embedding hotpin somewhere
//! that already tracks pins itself.

use crate::cid::{Cid, ContentPath};
use crate::error::NodeError;
use crate::node::{Node, NodeResult, PinEntry, PinMode, PinStream, SwarmStats};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

/// A call received by a [`MemoryNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    ResolveName(String),
    StatPath(ContentPath),
    ListPins { recursive: bool },
    IsPinned(Cid),
    Pin { path: ContentPath, recursive: bool },
    Unpin { cid: Cid, recursive: bool },
    DirectKeys,
    SwarmStats,
}

#[derive(Default)]
struct MemoryState {
    names: HashMap<String, ContentPath>,
    links: HashMap<ContentPath, Cid>,
    pins: BTreeMap<Cid, PinMode>,
    stats: Option<SwarmStats>,
    naming_outage: bool,
    pin_store_outage: bool,
    reject_pins: bool,
    failing_unpins: HashSet<Cid>,
    listing_cutoff: Option<usize>,
    pin_stall: Option<Duration>,
    calls: Vec<NodeCall>,
}

impl MemoryState {
    fn stat(&self, path: &ContentPath) -> NodeResult<Cid> {
        if let Some(cid) = self.links.get(path) {
            return Ok(cid.clone());
        }
        match path.ipfs_root() {
            Some((cid, None)) => Ok(cid),
            _ => Err(NodeError::NotFound(path.to_string())),
        }
    }

    fn check_pin_store(&self) -> NodeResult<()> {
        if self.pin_store_outage {
            Err(NodeError::Unreachable("pin store offline".into()))
        } else {
            Ok(())
        }
    }
}

/// An in-memory node.
#[derive(Default)]
pub struct MemoryNode {
    state: Mutex<MemoryState>,
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `pointer` to the immutable path of `cid`.
    pub async fn publish(&self, pointer: &str, cid: &Cid) {
        self.bind(pointer, ContentPath::ipfs(cid)).await;
    }

    /// Bind `pointer` to an arbitrary content path.
    pub async fn bind(&self, pointer: &str, path: ContentPath) {
        self.state.lock().await.names.insert(pointer.to_string(), path);
    }

    /// Remove the binding for `pointer`.
    pub async fn unpublish(&self, pointer: &str) {
        self.state.lock().await.names.remove(pointer);
    }

    /// Make `path` dereference to `cid`.
    pub async fn link(&self, path: ContentPath, cid: Cid) {
        self.state.lock().await.links.insert(path, cid);
    }

    /// Place a pin without going through the recorded API, as an operator would.
    pub async fn insert_pin(&self, cid: Cid, mode: PinMode) {
        self.state.lock().await.pins.insert(cid, mode);
    }

    /// Snapshot of the pin set.
    pub async fn pins(&self) -> BTreeMap<Cid, PinMode> {
        self.state.lock().await.pins.clone()
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<NodeCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Number of pin and unpin calls received so far.
    pub async fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, NodeCall::Pin { .. } | NodeCall::Unpin { .. }))
            .count()
    }

    pub async fn set_swarm_stats(&self, stats: SwarmStats) {
        self.state.lock().await.stats = Some(stats);
    }

    /// Fail every naming-system lookup.
    pub async fn set_naming_outage(&self, down: bool) {
        self.state.lock().await.naming_outage = down;
    }

    /// Fail every listing and membership query.
    pub async fn set_pin_store_outage(&self, down: bool) {
        self.state.lock().await.pin_store_outage = down;
    }

    /// Reject every pin request.
    pub async fn set_reject_pins(&self, reject: bool) {
        self.state.lock().await.reject_pins = reject;
    }

    /// Break pin listings after `entries` entries with an error.
    pub async fn set_listing_cutoff(&self, entries: Option<usize>) {
        self.state.lock().await.listing_cutoff = entries;
    }

    /// Commit each pin, then hold the reply back for `stall`.
    pub async fn set_pin_stall(&self, stall: Option<Duration>) {
        self.state.lock().await.pin_stall = stall;
    }

    /// Reject unpin requests for `cid`.
    pub async fn fail_unpin(&self, cid: Cid) {
        self.state.lock().await.failing_unpins.insert(cid);
    }
}

#[async_trait]
impl Node for MemoryNode {
    async fn resolve_name(&self, pointer: &str) -> NodeResult<ContentPath> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::ResolveName(pointer.to_string()));
        if state.naming_outage {
            return Err(NodeError::Unreachable("naming system offline".into()));
        }
        state
            .names
            .get(pointer)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(pointer.to_string()))
    }

    async fn stat_path(&self, path: &ContentPath) -> NodeResult<Cid> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::StatPath(path.clone()));
        if state.naming_outage {
            return Err(NodeError::Unreachable("naming system offline".into()));
        }
        state.stat(path)
    }

    async fn list_pins(&self, recursive: bool) -> NodeResult<PinStream> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::ListPins { recursive });
        state.check_pin_store()?;
        let wanted = if recursive {
            PinMode::Recursive
        } else {
            PinMode::Direct
        };
        let mut entries: Vec<NodeResult<PinEntry>> = state
            .pins
            .iter()
            .filter(|(_, mode)| **mode == wanted)
            .map(|(cid, mode)| Ok(PinEntry::new(cid.clone(), *mode)))
            .collect();
        if let Some(cutoff) = state.listing_cutoff {
            entries.truncate(cutoff);
            entries.push(Err(NodeError::Unreachable("pin listing interrupted".into())));
        }
        Ok(stream::iter(entries).boxed())
    }

    async fn is_pinned(&self, cid: &Cid) -> NodeResult<Option<PinMode>> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::IsPinned(cid.clone()));
        state.check_pin_store()?;
        Ok(state.pins.get(cid).copied())
    }

    async fn pin(&self, path: &ContentPath, recursive: bool) -> NodeResult<()> {
        let stall = {
            let mut state = self.state.lock().await;
            state.calls.push(NodeCall::Pin {
                path: path.clone(),
                recursive,
            });
            if state.reject_pins {
                return Err(NodeError::Rejected {
                    status: 500,
                    message: "pin rejected".into(),
                });
            }
            let cid = state.stat(path)?;
            let mode = match (state.pins.get(&cid), recursive) {
                (_, true) | (Some(PinMode::Recursive), false) => PinMode::Recursive,
                _ => PinMode::Direct,
            };
            state.pins.insert(cid, mode);
            state.pin_stall
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        Ok(())
    }

    async fn unpin(&self, cid: &Cid, recursive: bool) -> NodeResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::Unpin {
            cid: cid.clone(),
            recursive,
        });
        if state.failing_unpins.contains(cid) {
            return Err(NodeError::Rejected {
                status: 500,
                message: format!("cannot unpin {}", cid),
            });
        }
        match state.pins.get(cid).copied() {
            None | Some(PinMode::Indirect) => Err(NodeError::NotPinned(cid.clone())),
            Some(PinMode::Recursive) if !recursive => Err(NodeError::Rejected {
                status: 500,
                message: format!("{} is pinned recursively", cid),
            }),
            Some(_) => {
                state.pins.remove(cid);
                Ok(())
            }
        }
    }

    async fn direct_keys(&self) -> NodeResult<Vec<Cid>> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::DirectKeys);
        state.check_pin_store()?;
        Ok(state
            .pins
            .iter()
            .filter(|(_, mode)| **mode == PinMode::Direct)
            .map(|(cid, _)| cid.clone())
            .collect())
    }

    async fn swarm_stats(&self) -> NodeResult<SwarmStats> {
        let mut state = self.state.lock().await;
        state.calls.push(NodeCall::SwarmStats);
        state.stats.ok_or(NodeError::Unsupported("swarm stats"))
    }
}

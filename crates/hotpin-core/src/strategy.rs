//! Pin strategies: how a tick drives the pin set toward the hot CID.
//!
//! Both strategies converge on one loop-owned pin equal to the latest
//! resolution. They differ in what they ask the node:
//!
//! - [`PinStrategy::RecursiveSweep`] walks the recursive pin listing,
//!   removes every candidate that is not the hot CID and pins the hot CID
//!   recursively if the listing did not contain it.
//! - [`PinStrategy::DirectSlot`] asks whether the hot CID is pinned. If not,
//!   it clears the candidate direct pins and pins the hot CID directly.
//!
//! Which pins count as candidates is decided by [`OwnershipScope`].

use crate::cid::{Cid, ContentPath};
use crate::error::{Error, NodeError, PinStoreError, StoreOp};
use crate::ledger::PinLedger;
use crate::node::{Node, PinMode};
use crate::report::{ActionResult, PinOp, TickOutcome, TickReport};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How the hot slot is kept in the pin set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinStrategy {
    #[default]
    RecursiveSweep,
    DirectSlot,
}

impl fmt::Display for PinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStrategy::RecursiveSweep => f.write_str("recursive-sweep"),
            PinStrategy::DirectSlot => f.write_str("direct-slot"),
        }
    }
}

impl FromStr for PinStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recursive-sweep" | "recursive" => Ok(PinStrategy::RecursiveSweep),
            "direct-slot" | "direct" => Ok(PinStrategy::DirectSlot),
            other => Err(Error::Config(format!("unknown pin strategy {:?}", other))),
        }
    }
}

/// Which existing pins a tick may remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipScope {
    /// Only pins recorded in the ownership ledger.
    #[default]
    Owned,
    /// Every pin of the strategy's mode, whoever placed it.
    All,
}

impl fmt::Display for OwnershipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipScope::Owned => f.write_str("owned"),
            OwnershipScope::All => f.write_str("all"),
        }
    }
}

impl FromStr for OwnershipScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owned" => Ok(OwnershipScope::Owned),
            "all" => Ok(OwnershipScope::All),
            other => Err(Error::Config(format!("unknown ownership scope {:?}", other))),
        }
    }
}

impl PinStrategy {
    /// Run this strategy's half of a tick against an already resolved target.
    pub(crate) async fn converge(self, slot: &Slot<'_>, target: &Cid, report: &mut TickReport) {
        match self {
            PinStrategy::RecursiveSweep => slot.recursive_sweep(target, report).await,
            PinStrategy::DirectSlot => slot.direct_slot(target, report).await,
        }
    }
}

/// Everything a strategy touches during one tick.
pub(crate) struct Slot<'a> {
    pub node: &'a dyn Node,
    pub ledger: &'a dyn PinLedger,
    pub scope: OwnershipScope,
}

impl Slot<'_> {
    async fn recursive_sweep(&self, target: &Cid, report: &mut TickReport) {
        let Some(owned) = self.owned_pins(report) else {
            return;
        };

        let mut pins = match self.node.list_pins(true).await {
            Ok(pins) => pins,
            Err(source) => {
                self.unavailable(PinStoreError::new(StoreOp::List, "recursive pins", source), report);
                return;
            }
        };

        let mut present = false;
        let mut listed = HashSet::new();
        let mut complete = true;
        while let Some(item) = pins.next().await {
            let entry = match item {
                Ok(entry) => entry,
                Err(source) => {
                    let err = PinStoreError::new(StoreOp::List, "recursive pins", source);
                    warn!(error_kind = "pin_store", error = %err, "pin listing interrupted");
                    report.errors.push(err.to_string());
                    complete = false;
                    break;
                }
            };
            listed.insert(entry.cid.clone());
            if entry.cid == *target {
                present = true;
            } else if self.in_scope(&owned, &entry.cid) {
                self.remove(&entry.cid, true, report).await;
            }
        }

        // Owned pins the listing did not show: direct ones are left over from
        // the direct-slot strategy, recursive ones were removed behind our back.
        for (cid, mode) in &owned {
            if cid == target || listed.contains(cid) {
                continue;
            }
            match mode {
                PinMode::Recursive if complete => {
                    debug!(cid = %cid, "owned pin vanished from node, forgetting it");
                    self.release(cid, report);
                }
                PinMode::Recursive => {}
                _ => self.remove(cid, false, report).await,
            }
        }

        // An incomplete listing cannot tell "absent" from "not listed yet".
        if !present && complete {
            self.add(target, true, report).await;
        } else if !present {
            debug!(cid = %target, "listing incomplete, leaving the pin for the next tick");
        }
    }

    async fn direct_slot(&self, target: &Cid, report: &mut TickReport) {
        let Some(owned) = self.owned_pins(report) else {
            return;
        };

        let current = match self.node.is_pinned(target).await {
            Ok(current) => current,
            Err(source) => {
                self.unavailable(PinStoreError::new(StoreOp::IsPinned, target, source), report);
                return;
            }
        };

        if current.is_some_and(PinMode::is_explicit) {
            debug!(cid = %target, mode = ?current, "hot data already pinned");
            for (cid, mode) in &owned {
                if cid != target {
                    self.remove(cid, mode.is_recursive(), report).await;
                }
            }
            return;
        }

        let direct = match self.node.direct_keys().await {
            Ok(keys) => keys,
            Err(source) => {
                self.unavailable(PinStoreError::new(StoreOp::DirectKeys, "direct pins", source), report);
                return;
            }
        };

        for cid in &direct {
            if cid != target && self.in_scope(&owned, cid) {
                self.remove(cid, false, report).await;
            }
        }
        for (cid, mode) in &owned {
            if cid == target {
                continue;
            }
            match mode {
                PinMode::Recursive => self.remove(cid, true, report).await,
                _ if !direct.contains(cid) => {
                    debug!(cid = %cid, "owned pin vanished from node, forgetting it");
                    self.release(cid, report);
                }
                _ => {}
            }
        }

        self.add(target, false, report).await;
    }

    /// Read the ledger. `None` means the tick must not touch anything.
    fn owned_pins(&self, report: &mut TickReport) -> Option<BTreeMap<Cid, PinMode>> {
        match self.ledger.owned() {
            Ok(owned) => Some(owned.into_iter().map(|p| (p.cid, p.mode)).collect()),
            Err(e) => {
                warn!(error_kind = "ledger", error = %e, "cannot read ownership ledger, skipping tick");
                report.outcome = TickOutcome::LedgerUnavailable(e.to_string());
                None
            }
        }
    }

    fn in_scope(&self, owned: &BTreeMap<Cid, PinMode>, cid: &Cid) -> bool {
        match self.scope {
            OwnershipScope::Owned => owned.contains_key(cid),
            OwnershipScope::All => true,
        }
    }

    fn unavailable(&self, err: PinStoreError, report: &mut TickReport) {
        warn!(error_kind = "pin_store", op = %err.op, error = %err, "cannot inspect pin set, skipping tick");
        report.outcome = TickOutcome::PinStoreUnavailable(err);
    }

    async fn remove(&self, cid: &Cid, recursive: bool, report: &mut TickReport) {
        let result = match self.node.unpin(cid, recursive).await {
            Ok(()) => {
                info!(cid = %cid, recursive, "unpinned stale data");
                ActionResult::Done
            }
            Err(NodeError::NotPinned(_)) => {
                debug!(cid = %cid, "already unpinned");
                ActionResult::AlreadyAbsent
            }
            Err(source) => {
                let err = PinStoreError::new(StoreOp::Unpin, cid, source);
                warn!(error_kind = "pin_store", cid = %cid, error = %err, "unpin failed");
                ActionResult::Failed(err)
            }
        };
        if result.is_success() {
            self.release(cid, report);
        }
        report.record(PinOp::Unpin, cid, recursive, result);
    }

    /// Claim `target`, then pin it.
    ///
    /// The claim goes first so that a pin the node commits is always owned,
    /// even if the tick is abandoned or the reply is lost. A claim whose pin
    /// never landed is forgotten by a later tick that does not find it.
    async fn add(&self, target: &Cid, recursive: bool, report: &mut TickReport) {
        let mode = if recursive {
            PinMode::Recursive
        } else {
            PinMode::Direct
        };
        if let Err(e) = self.ledger.claim(target, mode) {
            warn!(error_kind = "ledger", cid = %target, error = %e, "cannot record ownership, not pinning");
            report.errors.push(e.to_string());
            return;
        }

        let result = match self.node.pin(&ContentPath::ipfs(target), recursive).await {
            Ok(()) => {
                info!(cid = %target, recursive, "pinned hot data");
                ActionResult::Done
            }
            Err(source) => {
                // Only an answer from the node proves the pin did not happen.
                if !matches!(source, NodeError::Unreachable(_)) {
                    self.release(target, report);
                }
                let err = PinStoreError::new(StoreOp::Pin, target, source);
                warn!(error_kind = "pin_store", cid = %target, error = %err, "pin failed, retrying next tick");
                ActionResult::Failed(err)
            }
        };
        report.record(PinOp::Pin, target, recursive, result);
    }

    fn release(&self, cid: &Cid, report: &mut TickReport) {
        if let Err(e) = self.ledger.release(cid) {
            warn!(error_kind = "ledger", cid = %cid, error = %e, "could not drop ownership record");
            report.errors.push(e.to_string());
        }
    }
}

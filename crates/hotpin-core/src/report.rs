//! Per-tick results.
//!
//! Every pin and unpin a tick attempts is recorded with its own result, so
//! callers can tell "3 of 4 removed, 1 failed" apart from a clean sweep
//! without scraping logs.

use crate::cid::Cid;
use crate::error::{PinStoreError, ResolutionError};
use std::fmt;

/// Which kind of tick ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// The tick run at loop start, without delay.
    First,
    /// A tick run after the inter-tick delay.
    Subsequent,
}

impl fmt::Display for TickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickKind::First => f.write_str("first"),
            TickKind::Subsequent => f.write_str("subsequent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    Pin,
    Unpin,
}

/// What happened to one attempted pin or unpin.
#[derive(Debug)]
pub enum ActionResult {
    Done,
    /// Unpin of something that was not pinned; counts as done.
    AlreadyAbsent,
    Failed(PinStoreError),
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ActionResult::Failed(_))
    }
}

/// One attempted pin or unpin.
#[derive(Debug)]
pub struct PinAction {
    pub op: PinOp,
    pub cid: Cid,
    pub recursive: bool,
    pub result: ActionResult,
}

/// How a tick ended.
#[derive(Debug)]
pub enum TickOutcome {
    /// Every attempted action succeeded.
    Converged,
    /// At least one action, ledger update or listing page failed.
    Incomplete,
    /// The hot pointer could not be resolved; nothing was touched.
    ResolutionFailed(ResolutionError),
    /// The pin set could not be inspected; nothing was touched.
    PinStoreUnavailable(PinStoreError),
    /// The ownership ledger could not be read; nothing was touched.
    LedgerUnavailable(String),
}

/// The record of one reconciliation tick.
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub kind: TickKind,
    pub resolved: Option<Cid>,
    pub actions: Vec<PinAction>,
    /// Failures outside individual actions: ledger writes, interrupted listings.
    pub errors: Vec<String>,
    pub outcome: TickOutcome,
}

impl TickReport {
    pub(crate) fn new(tick: u64, kind: TickKind) -> Self {
        Self {
            tick,
            kind,
            resolved: None,
            actions: Vec::new(),
            errors: Vec::new(),
            outcome: TickOutcome::Converged,
        }
    }

    pub(crate) fn record(&mut self, op: PinOp, cid: &Cid, recursive: bool, result: ActionResult) {
        self.actions.push(PinAction {
            op,
            cid: cid.clone(),
            recursive,
            result,
        });
    }

    /// Settle the outcome once all actions are in.
    pub(crate) fn finish(&mut self) {
        if matches!(self.outcome, TickOutcome::Converged)
            && (self.failed() > 0 || !self.errors.is_empty())
        {
            self.outcome = TickOutcome::Incomplete;
        }
    }

    /// CIDs an unpin was attempted for, in order.
    pub fn unpin_attempts(&self) -> impl Iterator<Item = &Cid> {
        self.actions
            .iter()
            .filter(|a| a.op == PinOp::Unpin)
            .map(|a| &a.cid)
    }

    /// Number of unpins that left the CID unpinned.
    pub fn removed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.op == PinOp::Unpin && a.result.is_success())
            .count()
    }

    /// Number of failed actions.
    pub fn failed(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| !a.result.is_success())
            .count()
    }

    /// The CID pinned by this tick, if any.
    pub fn added(&self) -> Option<&Cid> {
        self.actions
            .iter()
            .find(|a| a.op == PinOp::Pin && a.result.is_success())
            .map(|a| &a.cid)
    }

    /// True if the tick resolved and every action succeeded.
    pub fn is_clean(&self) -> bool {
        matches!(self.outcome, TickOutcome::Converged)
    }

    /// True if the tick made no pin or unpin call.
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let resolved = self
            .resolved
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let added = self
            .added()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = match &self.outcome {
            TickOutcome::Converged => "converged",
            TickOutcome::Incomplete => "incomplete",
            TickOutcome::ResolutionFailed(_) => "resolution failed",
            TickOutcome::PinStoreUnavailable(_) => "pin store unavailable",
            TickOutcome::LedgerUnavailable(_) => "ledger unavailable",
        };
        format!(
            "tick {} ({}): {} | hot: {} | removed: {} | failed: {} | added: {}",
            self.tick,
            self.kind,
            state,
            resolved,
            self.removed(),
            self.failed(),
            added
        )
    }
}

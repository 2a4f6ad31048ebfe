//! Ownership ledger: which pins did this loop place?
//!
//! The node's pin set carries no notion of who pinned what. The ledger
//! records the pins the reconciler placed so that cleanup can leave
//! operator-placed pins alone.

use crate::cid::Cid;
use crate::error::{Error, Result};
use crate::node::PinMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A pin the reconciler placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedPin {
    pub cid: Cid,
    pub mode: PinMode,
    /// Unix seconds at which the pin was acknowledged by the node.
    pub claimed_at: u64,
}

impl OwnedPin {
    pub fn new(cid: Cid, mode: PinMode) -> Self {
        Self {
            cid,
            mode,
            claimed_at: unix_now(),
        }
    }
}

/// Persistent record of loop-owned pins.
///
/// Entries are claimed only after the node acknowledged the pin and released
/// only after the node acknowledged the unpin. Both operations are idempotent.
pub trait PinLedger: Send + Sync {
    /// All owned pins.
    fn owned(&self) -> Result<Vec<OwnedPin>>;

    /// Record that `cid` was pinned by us with `mode`.
    fn claim(&self, cid: &Cid, mode: PinMode) -> Result<()>;

    /// Forget `cid`. Forgetting an unknown CID is not an error.
    fn release(&self, cid: &Cid) -> Result<()>;
}

/// A ledger that lives as long as the process.
#[derive(Default)]
pub struct MemoryLedger {
    pins: Mutex<BTreeMap<Cid, OwnedPin>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Cid, OwnedPin>>> {
        self.pins
            .lock()
            .map_err(|_| Error::Ledger("ledger lock poisoned".into()))
    }
}

impl PinLedger for MemoryLedger {
    fn owned(&self) -> Result<Vec<OwnedPin>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn claim(&self, cid: &Cid, mode: PinMode) -> Result<()> {
        self.lock()?
            .insert(cid.clone(), OwnedPin::new(cid.clone(), mode));
        Ok(())
    }

    fn release(&self, cid: &Cid) -> Result<()> {
        self.lock()?.remove(cid);
        Ok(())
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

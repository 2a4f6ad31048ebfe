//! Persistent ownership ledger using RocksDB.

use crate::error::Result;
use hotpin_core::{Cid, OwnedPin, PinLedger, PinMode};
use rocksdb::{Options, DB};
use std::path::Path;

const OWNED_PREFIX: &[u8] = b"owned:";

/// Storage backend for the daemon's ownership ledger.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // --- Owned pins ---

    /// Store an owned pin.
    pub fn put_owned(&self, pin: &OwnedPin) -> Result<()> {
        let key = format!("owned:{}", pin.cid);
        let value = serde_json::to_vec(pin)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    /// Delete an owned pin.
    pub fn delete_owned(&self, cid: &Cid) -> Result<()> {
        let key = format!("owned:{}", cid);
        self.db.delete(key.as_bytes())?;
        Ok(())
    }

    /// List all owned pins.
    pub fn list_owned(&self) -> Result<Vec<OwnedPin>> {
        let mut pins = Vec::new();

        let iter = self.db.prefix_iterator(OWNED_PREFIX);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(OWNED_PREFIX) {
                let pin: OwnedPin = serde_json::from_slice(&value)?;
                pins.push(pin);
            } else {
                break;
            }
        }

        Ok(pins)
    }
}

impl PinLedger for Storage {
    fn owned(&self) -> hotpin_core::Result<Vec<OwnedPin>> {
        self.list_owned().map_err(ledger_error)
    }

    fn claim(&self, cid: &Cid, mode: PinMode) -> hotpin_core::Result<()> {
        self.put_owned(&OwnedPin::new(cid.clone(), mode))
            .map_err(ledger_error)
    }

    fn release(&self, cid: &Cid) -> hotpin_core::Result<()> {
        self.delete_owned(cid).map_err(ledger_error)
    }
}

fn ledger_error(e: crate::error::Error) -> hotpin_core::Error {
    hotpin_core::Error::Ledger(e.to_string())
}

//! Tick scheduling and shutdown.
//!
//! The reconciler never sleeps on its own; it asks a [`TickSource`] for the
//! next tick. [`IntervalTicker`] provides the real cadence: the first tick
//! fires at once, each later tick fires one interval after the previous
//! tick finished. [`ManualTicker`] fires when told to, for tests and for
//! callers that want to trigger a reconciliation themselves.

use crate::report::TickKind;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Something that says when the next tick is due.
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick. `None` means no more ticks will come.
    async fn next_tick(&mut self) -> Option<TickKind>;
}

/// Resolve once shutdown has been requested.
///
/// A dropped sender counts as a shutdown request.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// First tick immediately, then one tick per interval.
pub struct IntervalTicker {
    interval: Duration,
    started: bool,
    shutdown: watch::Receiver<bool>,
}

impl IntervalTicker {
    pub fn new(interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            interval,
            started: false,
            shutdown,
        }
    }
}

#[async_trait]
impl TickSource for IntervalTicker {
    async fn next_tick(&mut self) -> Option<TickKind> {
        if *self.shutdown.borrow() {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(TickKind::First);
        }
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => Some(TickKind::Subsequent),
            _ = shutdown_requested(&mut self.shutdown) => None,
        }
    }
}

/// Fires a tick each time its [`ManualTrigger`] is pulled.
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
    started: bool,
}

/// The handle that fires a [`ManualTicker`]. Dropping it ends the ticks.
#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::Sender<()>,
}

impl ManualTicker {
    pub fn channel() -> (ManualTrigger, ManualTicker) {
        let (tx, rx) = mpsc::channel(16);
        (
            ManualTrigger { tx },
            ManualTicker { rx, started: false },
        )
    }
}

impl ManualTrigger {
    /// Request one tick. Returns false if the ticker is gone.
    pub async fn fire(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

#[async_trait]
impl TickSource for ManualTicker {
    async fn next_tick(&mut self) -> Option<TickKind> {
        self.rx.recv().await?;
        if self.started {
            Some(TickKind::Subsequent)
        } else {
            self.started = true;
            Some(TickKind::First)
        }
    }
}

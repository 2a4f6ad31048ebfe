//! The hot-data pin reconciler.
//!
//! Runs forever (until shutdown) as one background task:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  tick    │──>│ resolve  │──>│ remove stale │──>│ pin hot data │
//! └──────────┘   └──────────┘   └──────────────┘   └──────────────┘
//!      ^              │ error                              │
//!      │              v                                    │
//!      └────────── wait for next tick <────────────────────┘
//! ```
//!
//! Ticks run strictly one after another. Every external call is wrapped:
//! an error is logged, recorded in the [`TickReport`] and the loop carries on.

use crate::cid::HotPointer;
use crate::error::{Error, NodeError, Result};
use crate::ledger::PinLedger;
use crate::node::Node;
use crate::report::{TickKind, TickOutcome, TickReport};
use crate::resolver::NameResolver;
use crate::schedule::{shutdown_requested, IntervalTicker, TickSource};
use crate::strategy::{OwnershipScope, PinStrategy, Slot};
use bytesize::ByteSize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default inter-tick delay.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Naming-system path of the current hot dataset.
    pub pointer: HotPointer,

    /// Delay between the end of one tick and the start of the next.
    pub interval: Duration,

    /// How the hot slot is kept in the pin set.
    pub strategy: PinStrategy,

    /// Which existing pins a tick may remove.
    pub scope: OwnershipScope,

    /// Log peer count and bandwidth totals at the start of each tick.
    pub swarm_stats: bool,
}

impl ReconcilerConfig {
    /// Config with defaults for everything but the pointer.
    pub fn new(pointer: HotPointer) -> Self {
        Self {
            pointer,
            interval: DEFAULT_INTERVAL,
            strategy: PinStrategy::default(),
            scope: OwnershipScope::default(),
            swarm_stats: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_strategy(mut self, strategy: PinStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_scope(mut self, scope: OwnershipScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_swarm_stats(mut self, enabled: bool) -> Self {
        self.swarm_stats = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("interval must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Keeps the node's hot-data pin in step with the hot pointer.
pub struct Reconciler {
    node: Arc<dyn Node>,
    ledger: Arc<dyn PinLedger>,
    resolver: NameResolver,
    config: ReconcilerConfig,
    ticks: AtomicU64,
    reports: Option<mpsc::UnboundedSender<TickReport>>,
}

impl Reconciler {
    /// Create a reconciler. Fails only if the configuration is invalid.
    pub fn new(
        node: Arc<dyn Node>,
        ledger: Arc<dyn PinLedger>,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: NameResolver::new(Arc::clone(&node)),
            node,
            ledger,
            config,
            ticks: AtomicU64::new(0),
            reports: None,
        })
    }

    /// Also send each finished tick's report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<TickReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Run one reconciliation tick.
    ///
    /// Public so callers and tests can drive ticks directly.
    pub async fn tick(&self, kind: TickKind) -> TickReport {
        let number = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let mut report = TickReport::new(number, kind);

        if self.config.swarm_stats {
            self.log_swarm_stats().await;
        }

        let target = match self.resolver.resolve(&self.config.pointer).await {
            Ok(cid) => cid,
            Err(e) => {
                warn!(
                    error_kind = "resolution",
                    pointer = %self.config.pointer,
                    stage = %e.stage,
                    "resolve hot data: {}",
                    e
                );
                report.outcome = TickOutcome::ResolutionFailed(e);
                return report;
            }
        };
        debug!(tick = number, cid = %target, "hot data resolved");
        report.resolved = Some(target.clone());

        let slot = Slot {
            node: self.node.as_ref(),
            ledger: self.ledger.as_ref(),
            scope: self.config.scope,
        };
        self.config
            .strategy
            .converge(&slot, &target, &mut report)
            .await;
        report.finish();
        report
    }

    /// Run ticks from `ticks` until it runs dry or shutdown is requested.
    ///
    /// A tick in progress when shutdown arrives is abandoned at its next
    /// suspension point. Ownership is claimed before each pin is issued, so
    /// a pin committed by an abandoned tick is still cleaned up later.
    pub async fn run<T: TickSource>(self, mut ticks: T, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Hot pin reconciler active | Pointer: {} | Strategy: {} | Scope: {} | Interval: {}s",
            self.config.pointer,
            self.config.strategy,
            self.config.scope,
            self.config.interval.as_secs()
        );

        while let Some(kind) = ticks.next_tick().await {
            let report = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown requested mid-tick, abandoning it");
                    break;
                }
                report = self.tick(kind) => report,
            };

            match &report.outcome {
                TickOutcome::Converged => info!("{}", report.summary()),
                TickOutcome::Incomplete => warn!("{}", report.summary()),
                _ => error!("{}", report.summary()),
            }

            if let Some(tx) = &self.reports {
                let _ = tx.send(report);
            }
        }

        info!("Hot pin reconciler stopped");
    }

    /// Spawn [`run`](Self::run) on the configured interval as a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let ticks = IntervalTicker::new(self.config.interval, shutdown.clone());
        tokio::spawn(self.run(ticks, shutdown))
    }

    async fn log_swarm_stats(&self) {
        match self.node.swarm_stats().await {
            Ok(stats) => info!(
                "Peers count: {}\tTotal Up: {}\tTotal Down: {}",
                stats.peers,
                ByteSize::b(stats.total_out).to_string_as(true),
                ByteSize::b(stats.total_in).to_string_as(true)
            ),
            Err(NodeError::Unsupported(_)) => {
                debug!("node does not report swarm stats")
            }
            Err(e) => warn!(error_kind = "stats", "get swarm stats: {}", e),
        }
    }
}

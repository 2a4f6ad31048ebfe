//! Hotpin Node - the daemon entry point.
//!
//! Architecture:
//! - One background reconciler task, ticking on a fixed interval
//! - Kubo RPC client for naming, stat and pin operations
//! - RocksDB ownership ledger in the data directory
//! - SIGINT / SIGTERM stop the loop; a tick in progress is abandoned

use crate::error::{Error, Result};
use crate::kubo::KuboNode;
use crate::storage::Storage;
use hotpin_core::{HotPointer, OwnershipScope, PinStrategy, Reconciler, ReconcilerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pointer followed when `HOTPIN_POINTER` is unset.
pub const DEFAULT_POINTER: &str = "/ipns/mirrors.getdeepin.org/.hotdata";

/// Configuration for a hotpin node.
#[derive(Debug, Clone)]
pub struct HotpinConfig {
    /// Naming-system path of the current hot dataset
    pub pointer: HotPointer,

    /// Base URL of the node's RPC API
    pub api_url: String,

    /// Delay between ticks
    pub interval: Duration,

    /// Hot slot strategy
    pub strategy: PinStrategy,

    /// Which existing pins a tick may remove
    pub scope: OwnershipScope,

    /// Data directory for the ownership ledger
    pub data_dir: PathBuf,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Upper bound on a single `pin/add`; unbounded when unset
    pub pin_timeout: Option<Duration>,

    /// Log swarm statistics each tick
    pub swarm_stats: bool,
}

impl HotpinConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let pointer = HotPointer::new(var("HOTPIN_POINTER", DEFAULT_POINTER))
            .map_err(|e| Error::Config(format!("HOTPIN_POINTER: {}", e)))?;

        let api_url = var("HOTPIN_API_URL", "http://127.0.0.1:5001");
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "HOTPIN_API_URL must be an http(s) URL, got {:?}",
                api_url
            )));
        }

        let interval = parse_secs("HOTPIN_INTERVAL_SECS", &var("HOTPIN_INTERVAL_SECS", "60"))?;

        let strategy: PinStrategy = var("HOTPIN_STRATEGY", "recursive-sweep")
            .parse()
            .map_err(|e| Error::Config(format!("HOTPIN_STRATEGY: {}", e)))?;

        let scope: OwnershipScope = var("HOTPIN_SCOPE", "owned")
            .parse()
            .map_err(|e| Error::Config(format!("HOTPIN_SCOPE: {}", e)))?;

        let data_dir = PathBuf::from(var("HOTPIN_DATA_DIR", "./hotpin-data"));

        let request_timeout = parse_secs(
            "HOTPIN_REQUEST_TIMEOUT_SECS",
            &var("HOTPIN_REQUEST_TIMEOUT_SECS", "120"),
        )?;

        let pin_timeout = lookup("HOTPIN_PIN_TIMEOUT_SECS")
            .map(|v| parse_secs("HOTPIN_PIN_TIMEOUT_SECS", &v))
            .transpose()?;

        let swarm_stats = parse_bool("HOTPIN_SWARM_STATS", &var("HOTPIN_SWARM_STATS", "true"))?;

        Ok(Self {
            pointer,
            api_url,
            interval,
            strategy,
            scope,
            data_dir,
            request_timeout,
            pin_timeout,
            swarm_stats,
        })
    }

    /// The reconciler's share of this configuration.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig::new(self.pointer.clone())
            .with_interval(self.interval)
            .with_strategy(self.strategy)
            .with_scope(self.scope)
            .with_swarm_stats(self.swarm_stats)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(Error::Config(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(Error::Config(format!(
            "{} must be a whole number of seconds, got {:?}",
            key, value
        ))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

/// A hotpin node instance.
pub struct HotpinNode {
    reconciler: Reconciler,
    config: HotpinConfig,
}

impl HotpinNode {
    /// Create a new node: open the ledger and build the RPC client.
    pub fn new(config: HotpinConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let ledger = Arc::new(Storage::open(config.data_dir.join("ledger"))?);
        let node = Arc::new(
            KuboNode::new(&config.api_url, config.request_timeout)?
                .with_pin_timeout(config.pin_timeout),
        );
        let reconciler = Reconciler::new(node, ledger, config.reconciler_config())?;

        Ok(Self { reconciler, config })
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!("Signal handler error: {}", e),
            }
            let _ = shutdown_tx.send(true);
        });

        self.run_until(shutdown_rx).await
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub async fn run_until(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("Hotpin node starting");
        tracing::info!("  Pointer: {}", self.config.pointer);
        tracing::info!("  API: {}", self.config.api_url);
        tracing::info!("  Strategy: {} (scope: {})", self.config.strategy, self.config.scope);
        tracing::info!("  Interval: {:?}", self.config.interval);
        match self.config.pin_timeout {
            Some(t) => tracing::info!("  Pin timeout: {:?}", t),
            None => tracing::info!("  Pin timeout: none"),
        }
        tracing::info!("  Data: {:?}", self.config.data_dir);

        self.reconciler
            .spawn(shutdown)
            .await
            .map_err(|e| Error::Task(e.to_string()))?;

        tracing::info!("Hotpin node stopped");
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

//! Kubo RPC client.
//!
//! Every RPC command is a `POST` to `/api/v0/<command>` with arguments in the
//! query string. Failures come back as a non-2xx status with a
//! `{"Message", "Code", "Type"}` body; the message text is the only place
//! Kubo says *why*, so "not pinned" is recognized from it.
//!
//! `pin/add` fetches the whole DAG before answering and may legitimately run
//! for hours, so it is bounded by its own optional timeout rather than the
//! request timeout every other command uses.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use hotpin_core::{
    Cid, ContentPath, Node, NodeError, NodeResult, PinEntry, PinMode, PinStream, SwarmStats,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// A [`Node`] backed by a Kubo daemon's RPC API.
#[derive(Clone)]
pub struct KuboNode {
    base_url: String,
    client: Client,
    request_timeout: Duration,
    pin_timeout: Option<Duration>,
}

impl KuboNode {
    /// Create a client for the RPC API at `base_url` (e.g. `http://127.0.0.1:5001`).
    ///
    /// `request_timeout` bounds connecting and every command except `pin/add`,
    /// which waits indefinitely unless [`with_pin_timeout`](Self::with_pin_timeout) says otherwise.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(request_timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout,
            pin_timeout: None,
        })
    }

    pub fn with_pin_timeout(mut self, pin_timeout: Option<Duration>) -> Self {
        self.pin_timeout = pin_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, query: &[(&str, &str)]) -> NodeResult<T> {
        self.call_within(command, query, Some(self.request_timeout)).await
    }

    async fn call_within<T: DeserializeOwned>(
        &self,
        command: &str,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> NodeResult<T> {
        let url = format!("{}/api/v0/{}", self.base_url, command);
        debug!("POST {} {:?}", url, query);

        let mut request = self.client.post(&url).query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(rpc_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| NodeError::Malformed(format!("{}: {}", command, e)))
    }

    async fn pin_ls(&self, kind: &str) -> NodeResult<Vec<PinEntry>> {
        let response: PinLsResponse = self.call("pin/ls", &[("type", kind)]).await?;
        response.into_entries()
    }
}

#[async_trait]
impl Node for KuboNode {
    async fn resolve_name(&self, pointer: &str) -> NodeResult<ContentPath> {
        let response: NameResolveResponse = self
            .call("name/resolve", &[("arg", pointer), ("recursive", "true")])
            .await?;
        ContentPath::new(response.path).map_err(|e| NodeError::Malformed(e.to_string()))
    }

    async fn stat_path(&self, path: &ContentPath) -> NodeResult<Cid> {
        let response: DagResolveResponse =
            self.call("dag/resolve", &[("arg", path.as_str())]).await?;
        response.into_cid()
    }

    async fn list_pins(&self, recursive: bool) -> NodeResult<PinStream> {
        let kind = if recursive { "recursive" } else { "direct" };
        let entries = self.pin_ls(kind).await?;
        Ok(stream::iter(entries.into_iter().map(Ok)).boxed())
    }

    async fn is_pinned(&self, cid: &Cid) -> NodeResult<Option<PinMode>> {
        let result: NodeResult<PinLsResponse> = self
            .call("pin/ls", &[("arg", cid.as_str()), ("type", "all")])
            .await;

        match result {
            Ok(response) => {
                let entries = response.into_entries()?;
                Ok(entries.into_iter().find(|e| &e.cid == cid).map(|e| e.mode))
            }
            Err(NodeError::Rejected { message, .. }) if is_not_pinned(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn pin(&self, path: &ContentPath, recursive: bool) -> NodeResult<()> {
        let recursive = if recursive { "true" } else { "false" };
        let _: serde_json::Value = self
            .call_within(
                "pin/add",
                &[("arg", path.as_str()), ("recursive", recursive)],
                self.pin_timeout,
            )
            .await?;
        Ok(())
    }

    async fn unpin(&self, cid: &Cid, recursive: bool) -> NodeResult<()> {
        let flag = if recursive { "true" } else { "false" };
        let result: NodeResult<serde_json::Value> = self
            .call("pin/rm", &[("arg", cid.as_str()), ("recursive", flag)])
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(NodeError::Rejected { message, .. }) if is_not_pinned(&message) => {
                Err(NodeError::NotPinned(cid.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn direct_keys(&self) -> NodeResult<Vec<Cid>> {
        let entries = self.pin_ls("direct").await?;
        Ok(entries.into_iter().map(|e| e.cid).collect())
    }

    async fn swarm_stats(&self) -> NodeResult<SwarmStats> {
        let peers: SwarmPeersResponse = self.call("swarm/peers", &[]).await?;
        let bw: BandwidthResponse = self.call("stats/bw", &[]).await?;

        Ok(SwarmStats {
            peers: peers.peers.map(|p| p.len()).unwrap_or(0),
            total_in: bw.total_in,
            total_out: bw.total_out,
        })
    }
}

/// Kubo says "not pinned" (pin/rm) and "is not pinned" (pin/ls with arg).
fn is_not_pinned(message: &str) -> bool {
    message.contains("not pinned")
}

/// Turn a non-2xx RPC answer into a [`NodeError`].
fn rpc_error(status: u16, body: &str) -> NodeError {
    let message = serde_json::from_str::<RpcErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    NodeError::Rejected { status, message }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NameResolveResponse {
    #[serde(rename = "Path")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct DagResolveResponse {
    #[serde(rename = "Cid")]
    cid: CidLink,
    #[serde(rename = "RemPath", default)]
    rem_path: String,
}

impl DagResolveResponse {
    /// The CID the path ends at. A leftover remainder means the walk stopped
    /// early and the CID names some ancestor, not the path itself.
    fn into_cid(self) -> NodeResult<Cid> {
        if !self.rem_path.is_empty() {
            return Err(NodeError::Malformed(format!(
                "dag/resolve stopped at {} with {:?} unresolved",
                self.cid.link, self.rem_path
            )));
        }
        Cid::new(self.cid.link).map_err(|e| NodeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CidLink {
    #[serde(rename = "/")]
    link: String,
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: BTreeMap<String, PinLsType>,
}

#[derive(Debug, Deserialize)]
struct PinLsType {
    #[serde(rename = "Type")]
    kind: String,
}

impl PinLsResponse {
    fn into_entries(self) -> NodeResult<Vec<PinEntry>> {
        self.keys
            .into_iter()
            .map(|(cid, ty)| {
                let cid = Cid::new(cid).map_err(|e| NodeError::Malformed(e.to_string()))?;
                let mode: PinMode = ty.kind.parse()?;
                Ok(PinEntry::new(cid, mode))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SwarmPeersResponse {
    #[serde(rename = "Peers", default)]
    peers: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct BandwidthResponse {
    #[serde(rename = "TotalIn", default)]
    total_in: u64,
    #[serde(rename = "TotalOut", default)]
    total_out: u64,
}

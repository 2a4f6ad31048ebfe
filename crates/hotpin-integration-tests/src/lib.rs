//! Test support for hotpin.
//!
//! [`FakeKubo`] serves the slice of the Kubo RPC API the daemon talks to,
//! backed by an in-memory name table, path table and pin set. Every request
//! is recorded so tests can check what was asked, not only the end state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

/// One recorded RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Command path below `/api/v0/`, e.g. `pin/add`.
    pub command: String,
    pub query: BTreeMap<String, String>,
}

impl RecordedRequest {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

#[derive(Default)]
struct FakeState {
    names: HashMap<String, String>,
    links: HashMap<String, String>,
    /// cid -> "recursive" | "direct"
    pins: BTreeMap<String, String>,
    peers: usize,
    total_in: u64,
    total_out: u64,
    failures: HashMap<String, (StatusCode, String)>,
    delays: HashMap<String, Duration>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<FakeState>>;

/// An HTTP server speaking enough Kubo RPC for the daemon.
pub struct FakeKubo {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeKubo {
    /// Bind to an ephemeral local port and start serving.
    pub async fn start() -> std::io::Result<Self> {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/v0/*command", post(dispatch))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Fake Kubo server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// Base URL for the RPC client.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Bind a name to a content path.
    pub async fn publish(&self, name: &str, path: &str) {
        self.state
            .lock()
            .await
            .names
            .insert(name.to_string(), path.to_string());
    }

    pub async fn unpublish(&self, name: &str) {
        self.state.lock().await.names.remove(name);
    }

    /// Make a content path dereference to `cid`.
    pub async fn link(&self, path: &str, cid: &str) {
        self.state
            .lock()
            .await
            .links
            .insert(path.to_string(), cid.to_string());
    }

    /// Place a pin directly, bypassing the RPC surface.
    pub async fn insert_pin(&self, cid: &str, recursive: bool) {
        self.state
            .lock()
            .await
            .pins
            .insert(cid.to_string(), pin_type(recursive).to_string());
    }

    /// Current pin set, cid -> type.
    pub async fn pins(&self) -> BTreeMap<String, String> {
        self.state.lock().await.pins.clone()
    }

    pub async fn set_swarm(&self, peers: usize, total_in: u64, total_out: u64) {
        let mut state = self.state.lock().await;
        state.peers = peers;
        state.total_in = total_in;
        state.total_out = total_out;
    }

    /// Answer every call to `command` with an RPC error.
    pub async fn fail(&self, command: &str, status: StatusCode, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(command.to_string(), (status, message.to_string()));
    }

    pub async fn recover(&self, command: &str) {
        self.state.lock().await.failures.remove(command);
    }

    /// Hold every answer to `command` back for `delay`, or stop doing so.
    /// The command still takes effect at once; only the reply is late.
    pub async fn delay(&self, command: &str, delay: Option<Duration>) {
        let mut state = self.state.lock().await;
        match delay {
            Some(d) => state.delays.insert(command.to_string(), d),
            None => state.delays.remove(command),
        };
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Requests received for one command.
    pub async fn requests_for(&self, command: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.command == command)
            .collect()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }
}

impl Drop for FakeKubo {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn pin_type(recursive: bool) -> &'static str {
    if recursive {
        "recursive"
    } else {
        "direct"
    }
}

fn rpc_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "Message": message.into(), "Code": 0, "Type": "error" });
    (status, Json(body)).into_response()
}

fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

async fn dispatch(
    State(state): State<Shared>,
    Path(command): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let (response, delay) = {
        let mut state = state.lock().await;
        state.requests.push(RecordedRequest {
            command: command.clone(),
            query: query.clone(),
        });
        let delay = state.delays.get(&command).copied();
        (answer(&mut state, &command, &query), delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    response
}

fn answer(state: &mut FakeState, command: &str, query: &BTreeMap<String, String>) -> Response {
    if let Some((status, message)) = state.failures.get(command) {
        return rpc_error(*status, message.clone());
    }

    let arg = query.get("arg").cloned().unwrap_or_default();
    let flag = |key: &str| query.get(key).map(|v| v == "true").unwrap_or(true);

    match command {
        "name/resolve" => match state.names.get(&arg) {
            Some(path) => ok(json!({ "Path": path })),
            None => rpc_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not resolve name {}", arg),
            ),
        },
        "dag/resolve" => match stat(state, &arg) {
            Some(cid) => ok(json!({ "Cid": { "/": cid }, "RemPath": "" })),
            None => rpc_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("no link named {:?}", arg),
            ),
        },
        "pin/ls" => pin_ls(state, &arg, query.get("type").map(String::as_str)),
        "pin/add" => match stat(state, &arg) {
            Some(cid) => {
                let recursive = flag("recursive");
                let keep_recursive = state.pins.get(&cid).map(|t| t == "recursive") == Some(true);
                let kind = pin_type(recursive || keep_recursive);
                state.pins.insert(cid.clone(), kind.to_string());
                ok(json!({ "Pins": [cid] }))
            }
            None => rpc_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("pin: {} not found", arg),
            ),
        },
        "pin/rm" => {
            let recursive = flag("recursive");
            match state.pins.get(&arg).cloned().as_deref() {
                None => rpc_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "not pinned or pinned indirectly",
                ),
                Some("recursive") if !recursive => rpc_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{} is pinned recursively", arg),
                ),
                Some(_) => {
                    state.pins.remove(&arg);
                    ok(json!({ "Pins": [arg] }))
                }
            }
        }
        "swarm/peers" => {
            let peers: Vec<Value> = (0..state.peers)
                .map(|i| json!({ "Peer": format!("12D3KooFakePeer{}", i) }))
                .collect();
            ok(json!({ "Peers": peers }))
        }
        "stats/bw" => ok(json!({
            "TotalIn": state.total_in,
            "TotalOut": state.total_out,
            "RateIn": 0.0,
            "RateOut": 0.0,
        })),
        other => rpc_error(
            StatusCode::NOT_FOUND,
            format!("unknown command {:?}", other),
        ),
    }
}

fn stat(state: &FakeState, path: &str) -> Option<String> {
    if let Some(cid) = state.links.get(path) {
        return Some(cid.clone());
    }
    let rest = path.strip_prefix("/ipfs/")?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest.to_string())
    }
}

fn pin_ls(state: &FakeState, arg: &str, kind: Option<&str>) -> Response {
    let kind = kind.unwrap_or("all");
    let wanted = |t: &str| kind == "all" || kind == t;

    if !arg.is_empty() {
        let cid = arg.trim_start_matches("/ipfs/");
        return match state.pins.get(cid) {
            Some(t) if wanted(t) => ok(json!({ "Keys": { cid: { "Type": t } } })),
            _ => rpc_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("path '{}' is not pinned", arg),
            ),
        };
    }

    let keys: serde_json::Map<String, Value> = state
        .pins
        .iter()
        .filter(|(_, t)| wanted(t))
        .map(|(cid, t)| (cid.clone(), json!({ "Type": t })))
        .collect();
    ok(json!({ "Keys": keys }))
}

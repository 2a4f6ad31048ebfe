//! The Kubo client and the daemon against a fake RPC server.

use axum::http::StatusCode;
use futures::StreamExt;
use hotpin_core::{
    Cid, ContentPath, HotPointer, Node, NodeError, OwnershipScope, PinLedger, PinMode, Reconciler,
    ReconcilerConfig, TickKind, TickOutcome,
};
use hotpin_integration_tests::FakeKubo;
use hotpin_node::{HotpinConfig, HotpinNode, KuboNode, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;

const POINTER: &str = "/ipns/mirrors.example.org/.hotdata";

fn cid(s: &str) -> Cid {
    Cid::new(s).unwrap()
}

fn client(fake: &FakeKubo) -> KuboNode {
    KuboNode::new(&fake.url(), Duration::from_secs(5)).unwrap()
}

fn pins(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect()
}

#[tokio::test]
async fn resolve_and_stat_request_shapes() {
    let fake = FakeKubo::start().await.unwrap();
    fake.publish(POINTER, "/ipfs/bafyroot/hot").await;
    fake.link("/ipfs/bafyroot/hot", "bafyhot").await;
    let kubo = client(&fake);

    let path = kubo.resolve_name(POINTER).await.unwrap();
    assert_eq!(path.as_str(), "/ipfs/bafyroot/hot");
    let resolved = kubo.stat_path(&path).await.unwrap();
    assert_eq!(resolved, cid("bafyhot"));

    let requests = fake.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].command, "name/resolve");
    assert_eq!(requests[0].arg("arg"), Some(POINTER));
    assert_eq!(requests[0].arg("recursive"), Some("true"));
    assert_eq!(requests[1].command, "dag/resolve");
    assert_eq!(requests[1].arg("arg"), Some("/ipfs/bafyroot/hot"));
}

#[tokio::test]
async fn pin_listing_and_membership() {
    let fake = FakeKubo::start().await.unwrap();
    fake.insert_pin("bafyrec", true).await;
    fake.insert_pin("bafydir", false).await;
    let kubo = client(&fake);

    let listed: Vec<Cid> = kubo
        .list_pins(true)
        .await
        .unwrap()
        .map(|entry| entry.unwrap().cid)
        .collect()
        .await;
    assert_eq!(listed, vec![cid("bafyrec")]);
    assert_eq!(kubo.direct_keys().await.unwrap(), vec![cid("bafydir")]);

    assert_eq!(kubo.is_pinned(&cid("bafyrec")).await.unwrap(), Some(PinMode::Recursive));
    assert_eq!(kubo.is_pinned(&cid("bafydir")).await.unwrap(), Some(PinMode::Direct));
    assert_eq!(kubo.is_pinned(&cid("bafynone")).await.unwrap(), None);

    let ls = fake.requests_for("pin/ls").await;
    assert_eq!(ls[0].arg("type"), Some("recursive"));
    assert_eq!(ls[1].arg("type"), Some("direct"));
    assert_eq!(ls[2].arg("arg"), Some("bafyrec"));
    assert_eq!(ls[2].arg("type"), Some("all"));
}

#[tokio::test]
async fn pin_and_unpin() {
    let fake = FakeKubo::start().await.unwrap();
    let kubo = client(&fake);

    kubo.pin(&ContentPath::ipfs(&cid("bafyhot")), true).await.unwrap();
    assert_eq!(fake.pins().await, pins(&[("bafyhot", "recursive")]));

    let add = fake.requests_for("pin/add").await;
    assert_eq!(add[0].arg("arg"), Some("/ipfs/bafyhot"));
    assert_eq!(add[0].arg("recursive"), Some("true"));

    let err = kubo.unpin(&cid("bafyhot"), false).await.unwrap_err();
    assert!(matches!(err, NodeError::Rejected { status: 500, .. }));

    kubo.unpin(&cid("bafyhot"), true).await.unwrap();
    assert!(fake.pins().await.is_empty());

    let err = kubo.unpin(&cid("bafyhot"), true).await.unwrap_err();
    assert!(matches!(err, NodeError::NotPinned(ref c) if *c == cid("bafyhot")));
}

#[tokio::test]
async fn rpc_failures_map_to_node_errors() {
    let fake = FakeKubo::start().await.unwrap();
    fake.fail("name/resolve", StatusCode::INTERNAL_SERVER_ERROR, "routing: not found")
        .await;
    let kubo = client(&fake);

    match kubo.resolve_name(POINTER).await.unwrap_err() {
        NodeError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "routing: not found");
        }
        other => panic!("unexpected {:?}", other),
    }

    fake.recover("name/resolve").await;
    fake.publish(POINTER, "/ipfs/bafyroot").await;
    assert!(kubo.resolve_name(POINTER).await.is_ok());
    fake.unpublish(POINTER).await;
    assert!(matches!(
        kubo.resolve_name(POINTER).await,
        Err(NodeError::Rejected { status: 500, .. })
    ));

    let closed = KuboNode::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
    assert!(matches!(
        closed.resolve_name(POINTER).await,
        Err(NodeError::Unreachable(_))
    ));
}

#[tokio::test]
async fn swarm_stats_combines_peers_and_bandwidth() {
    let fake = FakeKubo::start().await.unwrap();
    fake.set_swarm(3, 2048, 1_048_576).await;
    let kubo = client(&fake);

    let stats = kubo.swarm_stats().await.unwrap();
    assert_eq!(stats.peers, 3);
    assert_eq!(stats.total_in, 2048);
    assert_eq!(stats.total_out, 1_048_576);
}

#[tokio::test]
async fn slow_pin_add_outlasts_the_request_timeout() {
    let fake = FakeKubo::start().await.unwrap();
    let kubo = KuboNode::new(&fake.url(), Duration::from_millis(200)).unwrap();
    fake.delay("pin/add", Some(Duration::from_millis(600))).await;
    fake.delay("pin/ls", Some(Duration::from_millis(600))).await;

    kubo.pin(&ContentPath::ipfs(&cid("bafyhot")), true).await.unwrap();
    assert_eq!(fake.pins().await, pins(&[("bafyhot", "recursive")]));

    assert!(matches!(
        kubo.is_pinned(&cid("bafyhot")).await,
        Err(NodeError::Unreachable(_))
    ));
}

#[tokio::test]
async fn pin_timeout_bounds_pin_add() {
    let fake = FakeKubo::start().await.unwrap();
    let kubo = KuboNode::new(&fake.url(), Duration::from_secs(5))
        .unwrap()
        .with_pin_timeout(Some(Duration::from_millis(100)));
    fake.delay("pin/add", Some(Duration::from_millis(600))).await;

    let err = kubo
        .pin(&ContentPath::ipfs(&cid("bafyhot")), true)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Unreachable(_)));

    fake.delay("pin/add", None).await;
    kubo.pin(&ContentPath::ipfs(&cid("bafyhot")), true).await.unwrap();
}

#[tokio::test]
async fn unanswered_pin_keeps_its_claim_until_the_listing_says_otherwise() {
    let fake = FakeKubo::start().await.unwrap();
    let dir = tempdir().unwrap();
    fake.publish(POINTER, "/ipfs/bafycid1").await;
    fake.delay("pin/add", Some(Duration::from_millis(600))).await;

    let ledger = Arc::new(Storage::open(dir.path()).unwrap());
    let node = KuboNode::new(&fake.url(), Duration::from_secs(5))
        .unwrap()
        .with_pin_timeout(Some(Duration::from_millis(100)));
    let config = ReconcilerConfig::new(HotPointer::new(POINTER).unwrap())
        .with_swarm_stats(false);
    let reconciler = Reconciler::new(Arc::new(node), ledger.clone(), config).unwrap();

    let report = reconciler.tick(TickKind::First).await;
    assert!(matches!(report.outcome, TickOutcome::Incomplete));
    let owned: Vec<Cid> = ledger.owned().unwrap().into_iter().map(|p| p.cid).collect();
    assert_eq!(owned, vec![cid("bafycid1")]);

    // The node committed the pin even though the client gave up on the reply.
    assert!(fake.pins().await.contains_key("bafycid1"));

    fake.delay("pin/add", None).await;
    fake.publish(POINTER, "/ipfs/bafycid2").await;
    let report = reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean(), "{}", report.summary());
    assert_eq!(fake.pins().await, pins(&[("bafycid2", "recursive")]));
}

#[tokio::test]
async fn swarm_stats_failure_does_not_hold_up_pinning() {
    let fake = FakeKubo::start().await.unwrap();
    let dir = tempdir().unwrap();
    fake.publish(POINTER, "/ipfs/bafyhot").await;
    fake.fail("swarm/peers", StatusCode::INTERNAL_SERVER_ERROR, "swarm offline")
        .await;

    let ledger = Arc::new(Storage::open(dir.path()).unwrap());
    let config = ReconcilerConfig::new(HotPointer::new(POINTER).unwrap());
    let reconciler = Reconciler::new(Arc::new(client(&fake)), ledger, config).unwrap();

    let report = reconciler.tick(TickKind::First).await;
    assert!(report.is_clean(), "{}", report.summary());
    assert_eq!(report.added(), Some(&cid("bafyhot")));
    assert_eq!(fake.requests_for("swarm/peers").await.len(), 1);
    assert!(fake.requests_for("stats/bw").await.is_empty());
    assert_eq!(fake.pins().await, pins(&[("bafyhot", "recursive")]));
}

#[tokio::test]
async fn reconciler_over_rpc_with_persistent_ledger() {
    let fake = FakeKubo::start().await.unwrap();
    let dir = tempdir().unwrap();
    fake.insert_pin("bafyoperator", true).await;

    let ledger = Arc::new(Storage::open(dir.path()).unwrap());
    let config = ReconcilerConfig::new(HotPointer::new(POINTER).unwrap())
        .with_scope(OwnershipScope::Owned);
    let reconciler = Reconciler::new(Arc::new(client(&fake)), ledger.clone(), config).unwrap();

    fake.publish(POINTER, "/ipfs/bafycid1").await;
    let report = reconciler.tick(TickKind::First).await;
    assert!(report.is_clean(), "{}", report.summary());
    assert_eq!(
        fake.pins().await,
        pins(&[("bafycid1", "recursive"), ("bafyoperator", "recursive")])
    );

    fake.publish(POINTER, "/ipfs/bafycid2").await;
    let report = reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean(), "{}", report.summary());
    assert_eq!(
        fake.pins().await,
        pins(&[("bafycid2", "recursive"), ("bafyoperator", "recursive")])
    );

    let owned: Vec<Cid> = ledger.owned().unwrap().into_iter().map(|p| p.cid).collect();
    assert_eq!(owned, vec![cid("bafycid2")]);

    fake.fail("name/resolve", StatusCode::INTERNAL_SERVER_ERROR, "could not resolve name")
        .await;
    fake.clear_requests().await;
    let report = reconciler.tick(TickKind::Subsequent).await;
    assert!(matches!(report.outcome, TickOutcome::ResolutionFailed(_)));
    assert!(fake.requests_for("pin/rm").await.is_empty());
    assert!(fake.requests_for("pin/add").await.is_empty());
    assert_eq!(
        fake.pins().await,
        pins(&[("bafycid2", "recursive"), ("bafyoperator", "recursive")])
    );
}

#[tokio::test]
async fn pin_store_error_is_recorded_and_retried() {
    let fake = FakeKubo::start().await.unwrap();
    let dir = tempdir().unwrap();
    fake.publish(POINTER, "/ipfs/bafyhot").await;
    fake.fail("pin/add", StatusCode::INTERNAL_SERVER_ERROR, "blockstore full")
        .await;

    let ledger = Arc::new(Storage::open(dir.path()).unwrap());
    let config = ReconcilerConfig::new(HotPointer::new(POINTER).unwrap());
    let reconciler = Reconciler::new(Arc::new(client(&fake)), ledger.clone(), config).unwrap();

    let report = reconciler.tick(TickKind::First).await;
    assert!(matches!(report.outcome, TickOutcome::Incomplete));
    assert_eq!(report.failed(), 1);
    assert!(ledger.owned().unwrap().is_empty());

    fake.recover("pin/add").await;
    let report = reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean());
    assert_eq!(report.added(), Some(&cid("bafyhot")));
    assert_eq!(fake.pins().await, pins(&[("bafyhot", "recursive")]));
}

#[tokio::test]
async fn daemon_pins_hot_data_until_shutdown() {
    let fake = FakeKubo::start().await.unwrap();
    let dir = tempdir().unwrap();
    fake.publish(POINTER, "/ipfs/bafyhot").await;

    let mut vars = BTreeMap::new();
    vars.insert("HOTPIN_POINTER", POINTER.to_string());
    vars.insert("HOTPIN_API_URL", fake.url());
    vars.insert("HOTPIN_DATA_DIR", dir.path().display().to_string());
    vars.insert("HOTPIN_SWARM_STATS", "false".to_string());
    let config = HotpinConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let node = HotpinNode::new(config).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon = tokio::spawn(node.run_until(shutdown_rx));

    let mut pinned = false;
    for _ in 0..250 {
        if fake.pins().await.contains_key("bafyhot") {
            pinned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(pinned, "daemon never pinned the hot data");

    shutdown_tx.send(true).unwrap();
    daemon.await.unwrap().unwrap();
    assert!(fake.requests_for("swarm/peers").await.is_empty());
}

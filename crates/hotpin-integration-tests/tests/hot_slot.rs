//! End-to-end reconciliation against the in-memory node.

use hotpin_core::{
    Cid, HotPointer, MemoryLedger, MemoryNode, NodeError, OwnershipScope, PinLedger, PinMode,
    PinStrategy, Reconciler, ReconcilerConfig, TickKind, TickOutcome,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const POINTER: &str = "/ipns/mirrors.example.org/.hotdata";

fn cid(s: &str) -> Cid {
    Cid::new(s).unwrap()
}

fn config(strategy: PinStrategy, scope: OwnershipScope) -> ReconcilerConfig {
    ReconcilerConfig::new(HotPointer::new(POINTER).unwrap())
        .with_strategy(strategy)
        .with_scope(scope)
}

fn pin_set(entries: &[(&str, PinMode)]) -> BTreeMap<Cid, PinMode> {
    entries.iter().map(|(c, m)| (cid(c), *m)).collect()
}

struct Harness {
    node: Arc<MemoryNode>,
    ledger: Arc<MemoryLedger>,
    reconciler: Reconciler,
}

impl Harness {
    fn new(strategy: PinStrategy, scope: OwnershipScope) -> Self {
        let node = Arc::new(MemoryNode::new());
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler =
            Reconciler::new(node.clone(), ledger.clone(), config(strategy, scope)).unwrap();
        Self {
            node,
            ledger,
            reconciler,
        }
    }
}

#[tokio::test]
async fn pointer_moves_then_naming_outage() {
    let h = Harness::new(PinStrategy::RecursiveSweep, OwnershipScope::Owned);

    h.node.publish(POINTER, &cid("bafycid1")).await;
    let report = h.reconciler.tick(TickKind::First).await;
    assert!(report.is_clean());
    assert_eq!(h.node.pins().await, pin_set(&[("bafycid1", PinMode::Recursive)]));

    h.node.publish(POINTER, &cid("bafycid2")).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean());
    assert_eq!(report.removed(), 1);
    assert_eq!(report.added(), Some(&cid("bafycid2")));
    assert_eq!(h.node.pins().await, pin_set(&[("bafycid2", PinMode::Recursive)]));

    h.node.set_naming_outage(true).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;
    assert!(matches!(report.outcome, TickOutcome::ResolutionFailed(_)));
    assert!(report.is_noop());
    assert_eq!(h.node.pins().await, pin_set(&[("bafycid2", PinMode::Recursive)]));

    h.node.set_naming_outage(false).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean());
    assert!(report.is_noop());
}

#[tokio::test]
async fn withdrawn_pointer_leaves_the_slot_alone() {
    let h = Harness::new(PinStrategy::DirectSlot, OwnershipScope::Owned);
    h.node.publish(POINTER, &cid("bafycid1")).await;
    h.reconciler.tick(TickKind::First).await;

    h.node.unpublish(POINTER).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;
    match &report.outcome {
        TickOutcome::ResolutionFailed(err) => {
            assert!(matches!(err.source, NodeError::NotFound(_)));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(report.is_noop());
    assert_eq!(h.node.pins().await, pin_set(&[("bafycid1", PinMode::Direct)]));
    assert_eq!(h.ledger.owned().unwrap().len(), 1);
}

#[tokio::test]
async fn single_slot_holds_across_any_sequence() {
    let sequence = ["c1", "c2", "c2", "c3", "c1", "c4", "c4"];

    for (strategy, mode) in [
        (PinStrategy::RecursiveSweep, PinMode::Recursive),
        (PinStrategy::DirectSlot, PinMode::Direct),
    ] {
        let h = Harness::new(strategy, OwnershipScope::Owned);

        for (i, c) in sequence.iter().enumerate() {
            h.node.publish(POINTER, &cid(c)).await;
            let kind = if i == 0 {
                TickKind::First
            } else {
                TickKind::Subsequent
            };
            let report = h.reconciler.tick(kind).await;

            assert!(report.is_clean(), "{}: tick {} not clean", strategy, i);
            assert_eq!(
                h.node.pins().await,
                pin_set(&[(c, mode)]),
                "{}: wrong pin set after tick {}",
                strategy,
                i
            );
            let owned: Vec<Cid> = h.ledger.owned().unwrap().into_iter().map(|p| p.cid).collect();
            assert_eq!(owned, vec![cid(c)]);
        }
    }
}

#[tokio::test]
async fn unchanged_pointer_is_idempotent() {
    for strategy in [PinStrategy::RecursiveSweep, PinStrategy::DirectSlot] {
        let h = Harness::new(strategy, OwnershipScope::Owned);
        h.node.publish(POINTER, &cid("bafyhot")).await;

        h.reconciler.tick(TickKind::First).await;
        let before = h.node.pins().await;
        let mutations = h.node.mutation_count().await;

        let report = h.reconciler.tick(TickKind::Subsequent).await;
        assert!(report.is_noop(), "{} repeated work", strategy);
        assert_eq!(h.node.pins().await, before);
        assert_eq!(h.node.mutation_count().await, mutations);
    }
}

#[tokio::test]
async fn cleanup_is_best_effort() {
    let h = Harness::new(PinStrategy::RecursiveSweep, OwnershipScope::All);
    for c in ["bafya", "bafyb", "bafyc"] {
        h.node.insert_pin(cid(c), PinMode::Recursive).await;
    }
    h.node.fail_unpin(cid("bafya")).await;
    h.node.publish(POINTER, &cid("bafyd")).await;

    let report = h.reconciler.tick(TickKind::First).await;

    let attempted: Vec<&Cid> = report.unpin_attempts().collect();
    assert_eq!(attempted, vec![&cid("bafya"), &cid("bafyb"), &cid("bafyc")]);
    assert_eq!(report.removed(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.added(), Some(&cid("bafyd")));
    assert!(matches!(report.outcome, TickOutcome::Incomplete));
    assert_eq!(
        h.node.pins().await,
        pin_set(&[("bafya", PinMode::Recursive), ("bafyd", PinMode::Recursive)])
    );
}

#[tokio::test]
async fn operator_pins_survive_owned_scope() {
    let h = Harness::new(PinStrategy::RecursiveSweep, OwnershipScope::Owned);
    h.node.insert_pin(cid("bafyoperator"), PinMode::Recursive).await;

    for (i, c) in ["c1", "c2", "c3"].iter().enumerate() {
        h.node.publish(POINTER, &cid(c)).await;
        let kind = if i == 0 {
            TickKind::First
        } else {
            TickKind::Subsequent
        };
        h.reconciler.tick(kind).await;

        let pins = h.node.pins().await;
        assert!(pins.contains_key(&cid("bafyoperator")));
        assert!(pins.contains_key(&cid(c)));
        assert_eq!(pins.len(), 2);
    }
}

#[tokio::test]
async fn all_scope_sweeps_operator_pins() {
    let h = Harness::new(PinStrategy::RecursiveSweep, OwnershipScope::All);
    h.node.insert_pin(cid("bafyoperator"), PinMode::Recursive).await;
    h.node.publish(POINTER, &cid("c1")).await;

    let report = h.reconciler.tick(TickKind::First).await;

    assert!(report.is_clean());
    assert_eq!(h.node.pins().await, pin_set(&[("c1", PinMode::Recursive)]));
}

#[tokio::test]
async fn pin_store_outage_changes_nothing() {
    let h = Harness::new(PinStrategy::DirectSlot, OwnershipScope::Owned);
    h.node.publish(POINTER, &cid("c1")).await;
    h.reconciler.tick(TickKind::First).await;

    h.node.publish(POINTER, &cid("c2")).await;
    h.node.set_pin_store_outage(true).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;

    assert!(matches!(report.outcome, TickOutcome::PinStoreUnavailable(_)));
    assert!(report.is_noop());
    assert_eq!(h.node.pins().await, pin_set(&[("c1", PinMode::Direct)]));

    h.node.set_pin_store_outage(false).await;
    let report = h.reconciler.tick(TickKind::Subsequent).await;
    assert!(report.is_clean());
    assert_eq!(h.node.pins().await, pin_set(&[("c2", PinMode::Direct)]));
}

#[tokio::test]
async fn switching_strategy_hands_over_the_slot() {
    let node = Arc::new(MemoryNode::new());
    let ledger = Arc::new(MemoryLedger::new());
    node.publish(POINTER, &cid("c1")).await;

    let direct = Reconciler::new(
        node.clone(),
        ledger.clone(),
        config(PinStrategy::DirectSlot, OwnershipScope::Owned),
    )
    .unwrap();
    direct.tick(TickKind::First).await;
    assert_eq!(node.pins().await, pin_set(&[("c1", PinMode::Direct)]));

    node.publish(POINTER, &cid("c2")).await;
    let sweep = Reconciler::new(
        node.clone(),
        ledger.clone(),
        config(PinStrategy::RecursiveSweep, OwnershipScope::Owned),
    )
    .unwrap();
    let report = sweep.tick(TickKind::First).await;

    assert!(report.is_clean());
    assert_eq!(node.pins().await, pin_set(&[("c2", PinMode::Recursive)]));
}

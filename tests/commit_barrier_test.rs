/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for committing synchronized data to a key-value store, and reloading it.

use round_abci::{
    persistence::{
        commit_barrier::{CommitBarrier, CommitRejected, KVStoreCommitBarrier},
        pluggables::KVStore,
        variables::PERIOD_DIFFS,
    },
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::Period,
};
use serde_json::json;

mod common;

use crate::common::{
    mem_db::MemDB,
    values::{balance_report, full_precision_floats},
};

fn registered() -> SynchronizedData {
    SynchronizedData::new(["participants"])
        .update(DataUpdates::new().with("participants", json!(["alice", "bob", "carol", "dave"])))
}

#[test]
fn append_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    assert_eq!(barrier.committed_head().unwrap(), None);

    let first = registered();
    let committed = barrier.propose_commit(&first).unwrap();
    assert_eq!(committed.period, Period::init());
    assert_eq!(committed.version, 1);
    assert_eq!(committed.data_hash, first.hash());
    assert_eq!(committed.new_diffs, 1);

    // Only the diffs added since the last commit are written.
    let second = first
        .update(DataUpdates::new().with("tx_state", json!("pre_transaction")))
        .update(DataUpdates::new().with("accepted_quote", json!({"price": 1800})));
    let committed = barrier.propose_commit(&second).unwrap();
    assert_eq!(committed.version, 3);
    assert_eq!(committed.new_diffs, 2);

    let head = barrier.committed_head().unwrap().unwrap();
    assert_eq!(head.period, Period::init());
    assert_eq!(head.version, 3);
    assert_eq!(head.log_len, 3);
    assert_eq!(head.data_hash, second.hash());

    assert_eq!(barrier.load_period(Period::init()).unwrap(), Some(second));
    assert_eq!(barrier.load_period(Period::new(1)).unwrap(), None);
}

#[test]
fn idempotent_commit_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    let data = registered();
    barrier.propose_commit(&data).unwrap();
    let num_entries = barrier.kv_store().len();

    let committed = barrier.propose_commit(&data).unwrap();
    assert_eq!(committed.new_diffs, 0);
    assert_eq!(committed.version, data.version());
    assert_eq!(barrier.kv_store().len(), num_entries);
}

#[test]
fn stale_commit_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    let old = registered();
    let new = old.update(DataUpdates::new().with("tx_state", json!("post_claim")));
    barrier.propose_commit(&new).unwrap();

    assert!(matches!(
        barrier.propose_commit(&old),
        Err(CommitRejected::Stale {
            committed_version: 2,
            proposed_version: 1,
            ..
        })
    ));
    assert_eq!(barrier.load_period(Period::init()).unwrap(), Some(new));
}

#[test]
fn diverged_commit_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    let base = registered();
    let committed = base.update(DataUpdates::new().with("tx_state", json!("post_claim")));
    barrier.propose_commit(&committed).unwrap();

    // A longer history that does not begin with the committed one.
    let fork = base
        .update(DataUpdates::new().with("tx_state", json!("post_refund")))
        .update(DataUpdates::new().with("final_tx_hash", json!("0x1")));
    assert!(matches!(
        barrier.propose_commit(&fork),
        Err(CommitRejected::Diverged { .. })
    ));

    // A history whose first diff differs from the committed one.
    let other_start = SynchronizedData::new(["participants"])
        .update(DataUpdates::new().with("participants", json!(["eve"])))
        .update(DataUpdates::new().with("tx_state", json!("post_claim")))
        .update(DataUpdates::new().with("final_tx_hash", json!("0x1")));
    assert!(matches!(
        barrier.propose_commit(&other_start),
        Err(CommitRejected::Diverged { .. })
    ));

    assert_eq!(barrier.load_period(Period::init()).unwrap(), Some(committed));
}

#[test]
fn new_period_commit_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    let period_0 = registered().update(DataUpdates::new().with("tx_state", json!("post_claim")));
    barrier.propose_commit(&period_0).unwrap();

    let period_1 = period_0.create_new_period();
    let committed = barrier.propose_commit(&period_1).unwrap();
    assert_eq!(committed.period, Period::new(1));
    assert_eq!(committed.new_diffs, 0);

    let period_1 = period_1.update(DataUpdates::new().with("exchange_balances", json!({"ETH": 1})));
    barrier.propose_commit(&period_1).unwrap();

    // Both periods can be reloaded.
    assert_eq!(barrier.load_period(Period::init()).unwrap(), Some(period_0));
    assert_eq!(barrier.load_period(Period::new(1)).unwrap(), Some(period_1.clone()));

    // Skipping a period is refused.
    let period_3 = period_1.create_new_period().create_new_period();
    assert!(matches!(
        barrier.propose_commit(&period_3),
        Err(CommitRejected::PeriodGap { .. })
    ));
}

#[test]
fn clear_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    barrier.propose_commit(&registered()).unwrap();

    let mut kv_store = barrier.kv_store().clone();
    kv_store.clear();
    assert_eq!(barrier.committed_head().unwrap(), None);
    assert_eq!(barrier.load_period(Period::init()).unwrap(), None);
}

#[test]
fn exact_numbers_commit_test() {
    let mut barrier = KVStoreCommitBarrier::new(MemDB::new());
    let floats = full_precision_floats(512);

    // Each commit checks the stored diffs against the proposed history, so every number written by
    // an earlier round must read back exactly for the next commit to be accepted.
    let mut data = registered();
    barrier.propose_commit(&data).unwrap();
    for (i, chunk) in floats.chunks(32).enumerate() {
        data = data.update(
            DataUpdates::new()
                .with("exchange_balances", balance_report(chunk))
                .with("accepted_quote", json!({"price": chunk[0], "round": i})),
        );
        let committed = barrier.propose_commit(&data).unwrap();
        assert_eq!(committed.version, data.version());
        assert_eq!(committed.new_diffs, 1);
    }
    assert_eq!(barrier.kv_store().count_with_prefix(&PERIOD_DIFFS), data.history_len());

    let loaded = barrier.load_period(Period::init()).unwrap().unwrap();
    assert_eq!(loaded.hash(), data.hash());
    assert_eq!(loaded, data);

    // Re-proposing the loaded data is a no-op.
    assert_eq!(barrier.propose_commit(&loaded).unwrap().new_diffs, 0);

    let next_period = loaded.create_new_period();
    barrier.propose_commit(&next_period).unwrap();
    assert_eq!(
        barrier.load_period(Period::new(1)).unwrap().unwrap().get("participants"),
        data.get("participants")
    );
}

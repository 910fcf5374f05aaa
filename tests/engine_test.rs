/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests that drive an [`AbciAppEngine`] directly, with every participant's payload submitted by hand.

use std::sync::{mpsc, Arc};

use round_abci::{
    abci_app::{AbciApp, AbciAppEngine, EngineError, Transition, CHAIN_DONE},
    apps::{
        compositions::executor_composite,
        qs_executor::{self, *},
        registration::{self, PARTICIPANTS, REGISTRATION_STARTUP_ROUND},
        reset_pause::RESET_AND_PAUSE_ROUND,
        swap::{FINALISED, FINAL_TX_HASH, MOST_VOTED_TX_HASH, POST_CLAIM, POST_NEW_SWAP, TX_STATE},
        transaction_settlement::{
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND, SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
            VALIDATE_TRANSACTION_ROUND,
        },
        ui_loader::{self, ERROR_ROUND, HEALTHCHECK_ROUND},
        DONE, ROUND_TIMEOUT,
    },
    events::EngineEvent,
    rounds::{PayloadError, RevotePolicy, RoundError},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::{
        basic::{Event, Period, RoundCount, RoundId, Timestamp},
        crypto_primitives::Keypair,
        payload::Payload,
    },
};
use serde_json::{json, Value};

mod common;

use crate::common::participants::{keypairs, participant_set};

/// An engine together with the keypairs of all of its participants.
struct Harness {
    keypairs: Vec<Keypair>,
    engine: AbciAppEngine,
}

impl Harness {
    fn new(app: AbciApp, data: SynchronizedData, initial_state: Option<RoundId>) -> Result<Harness, EngineError> {
        let keypairs = keypairs(4);
        let app = Arc::new(app);
        let initial_state = initial_state.unwrap_or_else(|| app.initial_round().clone());
        let engine = AbciAppEngine::new_at(
            app,
            participant_set(&keypairs),
            data,
            RevotePolicy::default(),
            initial_state,
        )?;
        Ok(Harness { keypairs, engine })
    }

    fn payload(&self, keypair: &Keypair, content: Value) -> Payload {
        Payload::new(
            keypair,
            self.engine.current_round_id().clone(),
            self.engine.round_count(),
            content,
        )
    }

    /// Have every participant vote for `content`, then end the block.
    fn vote(&mut self, content: Value) -> Result<Option<Transition>, EngineError> {
        for keypair in self.keypairs.clone() {
            let payload = self.payload(&keypair, content.clone());
            self.engine.submit_payload(payload).unwrap();
        }
        self.engine.end_block()
    }
}

fn with_participants() -> SynchronizedData {
    SynchronizedData::new([PARTICIPANTS]).update(
        DataUpdates::new().with(PARTICIPANTS, json!(["alice", "bob", "carol", "dave"])),
    )
}

fn transition(from: RoundId, event: Event, to: RoundId, round_count: u64) -> Transition {
    Transition {
        from,
        event,
        to,
        round_count: RoundCount::new(round_count),
    }
}

#[test]
fn executor_composite_walkthrough_test() {
    let mut harness = Harness::new(
        executor_composite().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        None,
    )
    .unwrap();
    assert_eq!(harness.engine.current_round_id(), &REGISTRATION_STARTUP_ROUND);
    assert_eq!(harness.engine.round_count(), RoundCount::init());

    let steps = [
        (
            json!(["alice", "bob", "carol", "dave"]),
            transition(REGISTRATION_STARTUP_ROUND, DONE, COLLECT_EXCHANGE_DATA_ROUND, 2),
        ),
        (
            json!({"binance": {"ETH": 10}}),
            transition(COLLECT_EXCHANGE_DATA_ROUND, DONE, AWAIT_RFQS_ROUND, 3),
        ),
        (
            json!({"rfq": "eth-usdc", "price": 1800}),
            transition(AWAIT_RFQS_ROUND, QUOTE_ACCEPTED, PREPARE_SUPPLY_TRANSACTION_ROUND, 4),
        ),
        // Passes through the finalised round into transaction settlement.
        (
            json!("0xsupply"),
            transition(
                PREPARE_SUPPLY_TRANSACTION_ROUND,
                DONE,
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                6,
            ),
        ),
        (
            json!("randomness"),
            transition(
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                DONE,
                SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                7,
            ),
        ),
        (
            json!("keeper"),
            transition(
                SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                DONE,
                VALIDATE_TRANSACTION_ROUND,
                8,
            ),
        ),
        (
            json!("0xsupply"),
            transition(VALIDATE_TRANSACTION_ROUND, DONE, POST_TRANSACTION_ROUND, 10),
        ),
        (
            json!("0xsupply"),
            transition(
                POST_TRANSACTION_ROUND,
                POST_NEW_SWAP,
                AWAIT_BUYER_TRANSACTIONS_ROUND,
                11,
            ),
        ),
        (
            json!(false),
            transition(
                AWAIT_BUYER_TRANSACTIONS_ROUND,
                DONE,
                PREPARE_CLAIM_TRANSACTIONS_ROUND,
                12,
            ),
        ),
        (
            json!("0xclaim"),
            transition(
                PREPARE_CLAIM_TRANSACTIONS_ROUND,
                DONE,
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                14,
            ),
        ),
        (
            json!("randomness"),
            transition(
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                DONE,
                SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                15,
            ),
        ),
        (
            json!("keeper"),
            transition(
                SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                DONE,
                VALIDATE_TRANSACTION_ROUND,
                16,
            ),
        ),
        (
            json!("0xclaim"),
            transition(VALIDATE_TRANSACTION_ROUND, DONE, POST_TRANSACTION_ROUND, 18),
        ),
        (
            json!("0xclaim"),
            transition(POST_TRANSACTION_ROUND, POST_CLAIM, RESET_AND_PAUSE_ROUND, 20),
        ),
    ];

    for (content, expected) in steps {
        assert_eq!(harness.vote(content).unwrap(), Some(expected));
    }

    let before_reset = harness.engine.synchronized_data_snapshot();
    assert_eq!(before_reset.period(), Period::init());
    assert_eq!(before_reset.get(TX_STATE), Some(&json!("post_claim")));
    assert_eq!(before_reset.get(FINAL_TX_HASH), Some(&json!("0xclaim")));

    // Reset into the next period, and start the next swap.
    assert_eq!(
        harness.vote(json!(1)).unwrap(),
        Some(transition(RESET_AND_PAUSE_ROUND, DONE, COLLECT_EXCHANGE_DATA_ROUND, 22))
    );

    let data = harness.engine.synchronized_data_snapshot();
    assert_eq!(data.period(), Period::new(1));
    assert_eq!(data.history_len(), 0);
    assert!(data.contains(PARTICIPANTS));
    assert!(!data.contains(TX_STATE));
    assert!(!data.contains(MOST_VOTED_TX_HASH));
    assert!(!harness.engine.is_finished());
    assert!(!harness.engine.is_halted());
}

#[test]
fn agreement_despite_one_differing_payload_test() {
    let mut harness = Harness::new(
        qs_executor::abci_app().unwrap(),
        with_participants(),
        Some(COLLECT_EXCHANGE_DATA_ROUND),
    )
    .unwrap();

    let payloads: Vec<Payload> = harness
        .keypairs
        .iter()
        .enumerate()
        .map(|(i, keypair)| {
            let balance = if i == 2 { 11 } else { 10 };
            harness.payload(keypair, json!({"binance": {"ETH": balance}}))
        })
        .collect();
    for payload in payloads {
        harness.engine.submit_payload(payload).unwrap();
    }

    assert_eq!(
        harness.engine.end_block().unwrap(),
        Some(transition(COLLECT_EXCHANGE_DATA_ROUND, DONE, AWAIT_RFQS_ROUND, 1))
    );
    let data = harness.engine.synchronized_data_snapshot();
    assert_eq!(data.get(EXCHANGE_BALANCES), Some(&json!({"binance": {"ETH": 10}})));
    assert_eq!(data.get(TX_STATE), Some(&json!("pre_transaction")));
}

#[test]
fn no_transition_below_threshold_test() {
    let mut harness = Harness::new(
        qs_executor::abci_app().unwrap(),
        with_participants(),
        Some(COLLECT_EXCHANGE_DATA_ROUND),
    )
    .unwrap();

    for keypair in harness.keypairs[0..2].to_vec() {
        let payload = harness.payload(&keypair, json!({}));
        harness.engine.submit_payload(payload).unwrap();
    }
    assert_eq!(harness.engine.end_block().unwrap(), None);
    assert_eq!(harness.engine.current_round_id(), &COLLECT_EXCHANGE_DATA_ROUND);
    assert_eq!(harness.engine.round_count(), RoundCount::init());

    // Payloads for the wrong round instance are dropped.
    let stale = Payload::new(
        &harness.keypairs[2],
        COLLECT_EXCHANGE_DATA_ROUND,
        RoundCount::new(5),
        json!({}),
    );
    assert!(matches!(
        harness.engine.submit_payload(stale),
        Err(PayloadError::WrongRound { .. })
    ));
    assert_eq!(harness.engine.end_block().unwrap(), None);
}

// The executor, entered at post transaction after the supply transaction was settled.
fn after_supply_settlement() -> Harness {
    let data = with_participants().update(
        DataUpdates::new()
            .with(TX_STATE, json!("post_new_swap"))
            .with(MOST_VOTED_TX_HASH, json!("0xsupply"))
            .with(FINAL_TX_HASH, json!("0xsupply")),
    );
    Harness::new(qs_executor::abci_app().unwrap(), data, None).unwrap()
}

#[test]
fn prepare_claim_done_test() {
    let mut harness = after_supply_settlement();
    harness.vote(json!("0xsupply")).unwrap();
    harness.vote(json!(false)).unwrap();
    assert_eq!(
        harness.engine.current_round_id(),
        &PREPARE_CLAIM_TRANSACTIONS_ROUND
    );

    assert_eq!(
        harness.vote(json!("0xclaim")).unwrap(),
        Some(transition(
            PREPARE_CLAIM_TRANSACTIONS_ROUND,
            DONE,
            FINALISED_CLAIM_TRANSACTIONS_ROUND,
            3
        ))
    );
    assert!(harness.engine.is_finished());
    let data = harness.engine.synchronized_data_snapshot();
    assert_eq!(data.get(TX_STATE), Some(&json!("post_claim")));
    assert_eq!(data.get(MOST_VOTED_TX_HASH), Some(&json!("0xclaim")));
}

#[test]
fn prepare_claim_finalised_test() {
    let mut harness = after_supply_settlement();
    harness.vote(json!("0xsupply")).unwrap();

    // The claim was already settled in an earlier attempt.
    let data = harness
        .engine
        .synchronized_data_snapshot()
        .update(DataUpdates::new().with(TX_STATE, json!("post_claim")));
    harness.engine.process_event(data, DONE).unwrap();
    assert_eq!(
        harness.engine.current_round_id(),
        &PREPARE_CLAIM_TRANSACTIONS_ROUND
    );

    assert_eq!(
        harness.vote(json!("0xclaim")).unwrap(),
        Some(transition(
            PREPARE_CLAIM_TRANSACTIONS_ROUND,
            FINALISED,
            SUCCESSFUL_EXECUTION_ROUND,
            3
        ))
    );
    assert!(harness.engine.is_finished());
}

#[test]
fn post_transaction_with_pre_transaction_state_halts_test() {
    let data = with_participants().update(
        DataUpdates::new()
            .with(TX_STATE, json!("pre_transaction"))
            .with(FINAL_TX_HASH, json!("0xsupply")),
    );
    let mut harness = Harness::new(qs_executor::abci_app().unwrap(), data, None).unwrap();

    assert!(matches!(
        harness.vote(json!("0xsupply")),
        Err(EngineError::Round(RoundError::UnexpectedTxState { tx_state, .. })) if tx_state == "pre_transaction"
    ));
    assert!(harness.engine.is_halted());

    // A halted engine does nothing more.
    assert_eq!(harness.engine.end_block(), Err(EngineError::Halted));
    assert_eq!(
        harness.engine.update_time(Timestamp::from_millis(u64::MAX)),
        Err(EngineError::Halted)
    );
    let payload = harness.payload(&harness.keypairs[0].clone(), json!("0xsupply"));
    assert_eq!(
        harness.engine.submit_payload(payload),
        Err(PayloadError::NotAccepting(POST_TRANSACTION_ROUND))
    );
}

#[test]
fn post_transaction_without_tx_state_halts_test() {
    let data = with_participants().update(DataUpdates::new().with(FINAL_TX_HASH, json!("0x")));
    let mut harness = Harness::new(qs_executor::abci_app().unwrap(), data, None).unwrap();

    assert!(matches!(
        harness.vote(json!("0x")),
        Err(EngineError::Round(RoundError::UnexpectedTxState { .. }))
    ));
    assert!(harness.engine.is_halted());
}

#[test]
fn pre_condition_failed_test() {
    let result = Harness::new(
        qs_executor::abci_app().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        Some(COLLECT_EXCHANGE_DATA_ROUND),
    );
    assert_eq!(
        result.err(),
        Some(EngineError::PreConditionFailed {
            round_id: COLLECT_EXCHANGE_DATA_ROUND,
            missing: vec![PARTICIPANTS.to_string()],
        })
    );

    let result = Harness::new(qs_executor::abci_app().unwrap(), with_participants(), None);
    assert_eq!(
        result.err(),
        Some(EngineError::PreConditionFailed {
            round_id: POST_TRANSACTION_ROUND,
            missing: vec![FINAL_TX_HASH.to_string()],
        })
    );
}

#[test]
fn post_condition_failed_test() {
    let mut harness = Harness::new(
        qs_executor::abci_app().unwrap(),
        with_participants(),
        Some(COLLECT_EXCHANGE_DATA_ROUND),
    )
    .unwrap();
    harness.vote(json!({})).unwrap();
    harness.vote(json!({"price": 1800})).unwrap();
    assert_eq!(
        harness.engine.current_round_id(),
        &PREPARE_SUPPLY_TRANSACTION_ROUND
    );

    // Leave for the finalised round without the keys transaction settlement needs.
    assert_eq!(
        harness
            .engine
            .process_event(SynchronizedData::new(Vec::<String>::new()), DONE),
        Err(EngineError::PostConditionFailed {
            round_id: FINALISED_SUPPLY_TRANSACTIONS_ROUND,
            missing: vec![MOST_VOTED_TX_HASH.to_string(), TX_STATE.to_string()],
        })
    );
    assert!(harness.engine.is_halted());
}

#[test]
fn missing_transition_halts_test() {
    let mut harness = Harness::new(
        registration::abci_app().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        None,
    )
    .unwrap();
    let data = harness.engine.synchronized_data_snapshot();

    assert_eq!(
        harness.engine.process_event(data.clone(), Event::new("UNKNOWN")),
        Err(EngineError::MissingTransition {
            round_id: REGISTRATION_STARTUP_ROUND,
            event: Event::new("UNKNOWN"),
        })
    );
    assert_eq!(
        harness.engine.process_event(data, DONE),
        Err(EngineError::Halted)
    );
}

#[test]
fn not_an_initial_state_test() {
    let result = Harness::new(
        executor_composite().unwrap(),
        with_participants(),
        Some(AWAIT_RFQS_ROUND),
    );
    assert_eq!(
        result.err(),
        Some(EngineError::NotAnInitialState(AWAIT_RFQS_ROUND))
    );
}

#[test]
fn timeout_fires_once_test() {
    let mut harness = Harness::new(
        registration::abci_app().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        None,
    )
    .unwrap();
    let timed_out = |round_count| {
        Some(transition(
            REGISTRATION_STARTUP_ROUND,
            ROUND_TIMEOUT,
            REGISTRATION_STARTUP_ROUND,
            round_count,
        ))
    };

    // The first timestamp marks when the round was entered.
    assert_eq!(harness.engine.update_time(Timestamp::from_millis(1_000)), Ok(None));
    assert_eq!(harness.engine.update_time(Timestamp::from_millis(30_999)), Ok(None));
    assert_eq!(
        harness.engine.update_time(Timestamp::from_millis(31_000)),
        Ok(timed_out(1))
    );

    // The round was re-entered at 31s: the same timestamp does not fire it again, nor do timestamps
    // that go backwards.
    assert_eq!(harness.engine.update_time(Timestamp::from_millis(31_000)), Ok(None));
    assert_eq!(harness.engine.update_time(Timestamp::from_millis(5_000)), Ok(None));
    assert_eq!(harness.engine.update_time(Timestamp::from_millis(60_999)), Ok(None));
    assert_eq!(
        harness.engine.update_time(Timestamp::from_millis(61_000)),
        Ok(timed_out(2))
    );

    // Timing out keeps the synchronized data as it was.
    assert_eq!(harness.engine.synchronized_data_snapshot().version(), 0);
}

#[test]
fn entry_time_is_the_latest_timestamp_test() {
    let start = |timestamps: &[u64]| {
        let mut harness = Harness::new(
            ui_loader::abci_app().unwrap(),
            SynchronizedData::new(Vec::<String>::new()),
            None,
        )
        .unwrap();
        for millis in timestamps {
            harness.engine.update_time(Timestamp::from_millis(*millis)).unwrap();
        }
        harness.vote(json!({"components": ["solver"]})).unwrap();
        assert_eq!(harness.engine.current_round_id(), &HEALTHCHECK_ROUND);
        harness
    };
    let timed_out = Some(transition(HEALTHCHECK_ROUND, ROUND_TIMEOUT, ERROR_ROUND, 2));

    // The health check was entered after the 10s timestamp arrived.
    let mut late = start(&[0, 10_000]);
    assert_eq!(late.engine.update_time(Timestamp::from_millis(39_999)), Ok(None));
    assert_eq!(late.engine.update_time(Timestamp::from_millis(40_000)), Ok(timed_out.clone()));

    // The same timestamps, with the setup concluding in between, time the health check out 10s earlier.
    let mut early = start(&[0]);
    assert_eq!(early.engine.update_time(Timestamp::from_millis(10_000)), Ok(None));
    assert_eq!(early.engine.update_time(Timestamp::from_millis(29_999)), Ok(None));
    assert_eq!(early.engine.update_time(Timestamp::from_millis(30_000)), Ok(timed_out));
}

#[test]
fn round_without_timeout_never_times_out_test() {
    let mut harness = Harness::new(
        executor_composite().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        None,
    )
    .unwrap();
    harness.engine.update_time(Timestamp::from_millis(0)).unwrap();
    harness.engine.update_time(Timestamp::from_millis(20_000)).unwrap();
    harness.vote(json!(["alice"])).unwrap();

    // Collecting exchange data has no timeout.
    assert_eq!(
        harness.engine.update_time(Timestamp::from_millis(1_000_000)),
        Ok(None)
    );
    assert_eq!(harness.engine.current_round_id(), &COLLECT_EXCHANGE_DATA_ROUND);
}

#[test]
fn engine_events_test() {
    let keypairs = keypairs(4);
    let (event_publisher, events) = mpsc::channel();
    let mut engine = AbciAppEngine::new(
        Arc::new(registration::abci_app().unwrap()),
        participant_set(&keypairs),
        SynchronizedData::new(Vec::<String>::new()),
        RevotePolicy::Reject,
    )
    .unwrap()
    .with_event_publisher(Some(event_publisher));

    for keypair in &keypairs {
        let payload = Payload::new(
            keypair,
            REGISTRATION_STARTUP_ROUND,
            RoundCount::init(),
            json!(["alice"]),
        );
        engine.submit_payload(payload.clone()).unwrap();
        assert!(engine.submit_payload(payload).is_err());
    }
    engine.end_block().unwrap();
    drop(engine);

    let mut received = 0;
    let mut rejected = 0;
    let mut thresholds = 0;
    let mut transitions = Vec::new();
    let mut final_rounds = Vec::new();
    for event in events.iter() {
        match event {
            EngineEvent::ReceivePayload(_) => received += 1,
            EngineEvent::RejectPayload(event) => {
                assert_eq!(event.reason, PayloadError::DuplicateSender);
                rejected += 1
            }
            EngineEvent::ThresholdReached(_) => thresholds += 1,
            EngineEvent::Transition(event) => transitions.push((event.from, event.event, event.to)),
            EngineEvent::EnterFinalRound(event) => final_rounds.push(event.round_id),
            _ => {}
        }
    }

    assert_eq!(received, 4);
    assert_eq!(rejected, 4);
    assert_eq!(thresholds, 1);
    assert_eq!(
        transitions,
        vec![(
            REGISTRATION_STARTUP_ROUND,
            DONE,
            registration::FINISHED_REGISTRATION_ROUND
        )]
    );
    assert_eq!(final_rounds, vec![registration::FINISHED_REGISTRATION_ROUND]);
}

#[test]
fn chain_done_is_never_reported_as_the_cause_test() {
    let mut harness = Harness::new(
        executor_composite().unwrap(),
        SynchronizedData::new(Vec::<String>::new()),
        None,
    )
    .unwrap();
    let transition = harness.vote(json!(["alice"])).unwrap().unwrap();
    assert_ne!(transition.event, CHAIN_DONE);
    assert_eq!(transition.event, DONE);
}

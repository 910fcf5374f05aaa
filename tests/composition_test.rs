/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for chaining apps into composites, and for the bundled composites themselves.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use round_abci::{
    abci_app::{chain, AbciApp, AbciAppSpec, ChainError, CHAIN_DONE},
    apps::{
        compositions::{executor_composite, orchestrator_composite, solver_composite},
        qs_executor::{self, COLLECT_EXCHANGE_DATA_ROUND, POST_TRANSACTION_ROUND},
        registration::{
            self, FINISHED_REGISTRATION_ROUND, PARTICIPANTS, REGISTRATION_ROUND,
            REGISTRATION_STARTUP_ROUND,
        },
        reset_pause::{self, FINISHED_RESET_AND_PAUSE_ERROR_ROUND, RESET_AND_PAUSE_TIMEOUT},
        swap::MOST_VOTED_TX_HASH,
        transaction_settlement::{
            self, FAILED_ROUND, FINISHED_TRANSACTION_SUBMISSION_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND, SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
        },
        CollectSameRound, DONE, ROUND_TIMEOUT,
    },
    rounds::RoundKind,
    types::basic::RoundId,
};

#[test]
fn executor_composite_test() {
    let app = executor_composite().unwrap();

    assert_eq!(
        app.name(),
        "AgentRegistrationAbciApp+QSExecutorAbciApp+TransactionSubmissionAbciApp+ResetPauseAbciApp"
    );
    assert_eq!(app.initial_round(), &REGISTRATION_STARTUP_ROUND);
    assert_eq!(
        app.initial_states(),
        &BTreeSet::from([REGISTRATION_STARTUP_ROUND, REGISTRATION_ROUND])
    );
    assert_eq!(app.final_states(), &BTreeSet::from([FAILED_ROUND]));

    // Mapped final states pass through to the round they are mapped to, with a single edge.
    let edges: Vec<_> = app.edges(&FINISHED_REGISTRATION_ROUND).collect();
    assert_eq!(edges, vec![(&CHAIN_DONE, &COLLECT_EXCHANGE_DATA_ROUND)]);
    assert_eq!(
        app.next_round(&FINISHED_TRANSACTION_SUBMISSION_ROUND, &CHAIN_DONE),
        Some(&POST_TRANSACTION_ROUND)
    );
    assert_eq!(
        app.next_round(&FINISHED_RESET_AND_PAUSE_ERROR_ROUND, &CHAIN_DONE),
        Some(&REGISTRATION_ROUND)
    );
    assert!(!app.is_final(&FINISHED_REGISTRATION_ROUND));

    // Every app's rounds, timeouts and persisted keys are kept.
    let num_rounds = [
        registration::abci_app().unwrap(),
        qs_executor::abci_app().unwrap(),
        transaction_settlement::abci_app().unwrap(),
        reset_pause::abci_app().unwrap(),
    ]
    .iter()
    .map(|app| app.rounds().len())
    .sum::<usize>();
    assert_eq!(app.rounds().len(), num_rounds);
    assert!(app.event_to_timeout().contains_key(&ROUND_TIMEOUT));
    assert!(app.event_to_timeout().contains_key(&RESET_AND_PAUSE_TIMEOUT));
    assert!(app.cross_period_persisted_keys().contains(PARTICIPANTS));
}

#[test]
fn other_composites_test() {
    let solver = solver_composite().unwrap();
    assert_eq!(
        solver.name(),
        "AgentRegistrationAbciApp+QSSolverAbciApp+TransactionSubmissionAbciApp+ResetPauseAbciApp"
    );
    assert_eq!(solver.final_states(), &BTreeSet::from([FAILED_ROUND]));

    let orchestrator = orchestrator_composite().unwrap();
    assert_eq!(
        orchestrator.initial_states(),
        &BTreeSet::from([REGISTRATION_STARTUP_ROUND, REGISTRATION_ROUND])
    );
}

#[test]
fn chain_nothing_test() {
    assert_eq!(
        chain(&[], &BTreeMap::new()).unwrap_err(),
        ChainError::NoApps
    );
}

#[test]
fn chain_single_app_test() {
    let registration = registration::abci_app().unwrap();
    let chained = chain(&[registration.clone()], &BTreeMap::new()).unwrap();

    assert_eq!(chained.name(), registration.name());
    assert_eq!(chained.initial_states(), registration.initial_states());
    assert_eq!(chained.final_states(), registration.final_states());
}

#[test]
fn chain_duplicate_round_test() {
    let registration = registration::abci_app().unwrap();

    assert!(matches!(
        chain(&[registration.clone(), registration], &BTreeMap::new()),
        Err(ChainError::DuplicateRound { .. })
    ));
}

#[test]
fn chain_unknown_round_test() {
    let apps = [
        registration::abci_app().unwrap(),
        reset_pause::abci_app().unwrap(),
    ];
    let unknown = RoundId::new("UnknownRound");

    assert_eq!(
        chain(
            &apps,
            &BTreeMap::from([(FINISHED_REGISTRATION_ROUND, unknown.clone())])
        )
        .unwrap_err(),
        ChainError::UnknownRound(unknown)
    );
}

#[test]
fn chain_from_non_final_state_test() {
    let apps = [
        registration::abci_app().unwrap(),
        transaction_settlement::abci_app().unwrap(),
    ];

    assert_eq!(
        chain(
            &apps,
            &BTreeMap::from([(REGISTRATION_ROUND, RANDOMNESS_TRANSACTION_SUBMISSION_ROUND)])
        )
        .unwrap_err(),
        ChainError::NotAFinalState(REGISTRATION_ROUND)
    );
}

#[test]
fn chain_to_non_initial_state_test() {
    let apps = [
        registration::abci_app().unwrap(),
        transaction_settlement::abci_app().unwrap(),
    ];

    assert_eq!(
        chain(
            &apps,
            &BTreeMap::from([(
                FINISHED_REGISTRATION_ROUND,
                SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND
            )])
        )
        .unwrap_err(),
        ChainError::NotAnInitialState(SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND)
    );
}

#[test]
fn chain_data_contract_test() {
    // Registration guarantees the participants, but transaction settlement needs a transaction hash.
    let apps = [
        registration::abci_app().unwrap(),
        transaction_settlement::abci_app().unwrap(),
    ];

    assert_eq!(
        chain(
            &apps,
            &BTreeMap::from([(
                FINISHED_REGISTRATION_ROUND,
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND
            )])
        )
        .unwrap_err(),
        ChainError::DataContract {
            from: FINISHED_REGISTRATION_ROUND,
            to: RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
            missing: vec![MOST_VOTED_TX_HASH.to_string()],
        }
    );
}

#[test]
fn chain_conflicting_timeout_test() {
    const IMPATIENT_ROUND: RoundId = RoundId::new_static("ImpatientRound");
    const GAVE_UP_ROUND: RoundId = RoundId::new_static("GaveUpRound");

    let impatient = AbciApp::new(
        AbciAppSpec::builder()
            .name("ImpatientAbciApp")
            .initial_round(IMPATIENT_ROUND)
            .rounds(BTreeMap::from([
                (
                    IMPATIENT_ROUND,
                    RoundKind::agreement(CollectSameRound::new(IMPATIENT_ROUND, "impatient", DONE)),
                ),
                (GAVE_UP_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([(
                IMPATIENT_ROUND,
                BTreeMap::from([(DONE, GAVE_UP_ROUND), (ROUND_TIMEOUT, IMPATIENT_ROUND)]),
            )]))
            .final_states(BTreeSet::from([GAVE_UP_ROUND]))
            .event_to_timeout(BTreeMap::from([(ROUND_TIMEOUT, Duration::from_secs(5))]))
            .build(),
    )
    .unwrap();

    assert_eq!(
        chain(
            &[registration::abci_app().unwrap(), impatient],
            &BTreeMap::new()
        )
        .unwrap_err(),
        ChainError::ConflictingTimeout {
            event: ROUND_TIMEOUT,
            first: 30_000,
            second: 5_000,
        }
    );
}

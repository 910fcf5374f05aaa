/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The full consensus loops of the agents, chained from the apps in [`apps`](super).
//!
//! Every composite starts at registration, runs its business app, settles transactions if the
//! business app produced any, and resets into a new period before running the business app again. A
//! reset that fails sends the replicas back to registration.

use std::collections::BTreeMap;

use crate::{
    abci_app::{chain, AbciApp, ChainError},
    types::basic::RoundId,
};

use super::{
    orchestrator, qs_executor, qs_solver,
    registration::{self, FINISHED_REGISTRATION_ROUND, REGISTRATION_ROUND},
    reset_pause::{
        self, FINISHED_RESET_AND_PAUSE_ERROR_ROUND, FINISHED_RESET_AND_PAUSE_ROUND,
        RESET_AND_PAUSE_ROUND,
    },
    transaction_settlement::{
        self, FINISHED_TRANSACTION_SUBMISSION_ROUND, RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
    },
};

/// Registration, the [executor](qs_executor), transaction settlement, and reset and pause.
pub fn executor_composite() -> Result<AbciApp, ChainError> {
    use qs_executor::*;

    let transition_mapping = BTreeMap::from([
        (FINISHED_REGISTRATION_ROUND, COLLECT_EXCHANGE_DATA_ROUND),
        (SUCCESSFUL_EXECUTION_ROUND, RESET_AND_PAUSE_ROUND),
        (
            FINALISED_SUPPLY_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (
            FINALISED_CLAIM_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (
            FINALISED_REFUND_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (UNSUCCESSFUL_EXECUTION_ROUND, RESET_AND_PAUSE_ROUND),
        (FINISHED_TRANSACTION_SUBMISSION_ROUND, POST_TRANSACTION_ROUND),
        (FINISHED_RESET_AND_PAUSE_ROUND, COLLECT_EXCHANGE_DATA_ROUND),
        (FINISHED_RESET_AND_PAUSE_ERROR_ROUND, REGISTRATION_ROUND),
    ]);

    chain(
        &[
            registration::abci_app()?,
            qs_executor::abci_app()?,
            transaction_settlement::abci_app()?,
            reset_pause::abci_app()?,
        ],
        &transition_mapping,
    )
}

/// Registration, the [solver](qs_solver), transaction settlement, and reset and pause.
pub fn solver_composite() -> Result<AbciApp, ChainError> {
    use qs_solver::*;

    let transition_mapping = BTreeMap::from([
        (FINISHED_REGISTRATION_ROUND, AWAITING_OPPORTUNITY_ROUND),
        (SUCCESSFUL_EXECUTION_ROUND, RESET_AND_PAUSE_ROUND),
        (
            FINALISED_SWAP_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (
            FINALISED_CLAIM_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (
            FINALISED_REFUND_TRANSACTIONS_ROUND,
            RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
        ),
        (UNSUCCESSFUL_EXECUTION_ROUND, RESET_AND_PAUSE_ROUND),
        (NO_OPPORTUNITY_ROUND, RESET_AND_PAUSE_ROUND),
        (FINISHED_TRANSACTION_SUBMISSION_ROUND, POST_TRANSACTION_ROUND),
        (FINISHED_RESET_AND_PAUSE_ROUND, AWAITING_OPPORTUNITY_ROUND),
        (FINISHED_RESET_AND_PAUSE_ERROR_ROUND, REGISTRATION_ROUND),
    ]);

    chain(
        &[
            registration::abci_app()?,
            qs_solver::abci_app()?,
            transaction_settlement::abci_app()?,
            reset_pause::abci_app()?,
        ],
        &transition_mapping,
    )
}

/// Registration, the [orchestrator](orchestrator::qs_abci_app), and reset and pause.
pub fn orchestrator_composite() -> Result<AbciApp, ChainError> {
    let transition_mapping: BTreeMap<RoundId, RoundId> = BTreeMap::from([
        (FINISHED_REGISTRATION_ROUND, orchestrator::HEALTH_CHECK_ROUND),
        (
            orchestrator::SUCCESSFUL_DEPLOYMENT_ROUND,
            RESET_AND_PAUSE_ROUND,
        ),
        (FINISHED_RESET_AND_PAUSE_ROUND, orchestrator::HEALTH_CHECK_ROUND),
        (FINISHED_RESET_AND_PAUSE_ERROR_ROUND, REGISTRATION_ROUND),
    ]);

    chain(
        &[
            registration::abci_app()?,
            orchestrator::qs_abci_app()?,
            reset_pause::abci_app()?,
        ],
        &transition_mapping,
    )
}

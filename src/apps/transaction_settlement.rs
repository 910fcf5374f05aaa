/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transaction settlement: hands the transaction agreed under
//! [`MOST_VOTED_TX_HASH`](super::swap::MOST_VOTED_TX_HASH) to a keeper, and waits until replicas
//! agree that it settled.
//!
//! Rounds run in order: randomness, keeper selection, then validation. Validation ends in
//! [`FINISHED_TRANSACTION_SUBMISSION_ROUND`] if the transaction settled, and in [`FAILED_ROUND`]
//! otherwise. Every round falls back to an earlier one on [`ROUND_TIMEOUT`].
//!
//! Replicas submit the settled transaction's hash to [`VALIDATE_TRANSACTION_ROUND`], or `null` if
//! they could not verify it.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use crate::{
    abci_app::{AbciApp, AbciAppError, AbciAppSpec},
    rounds::{AgreedOutcome, RoundError, RoundKind, RoundLogic},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::{Event, RoundId},
};

use super::{
    edges, keys,
    swap::{FINAL_TX_HASH, MOST_VOTED_TX_HASH},
    CollectSameRound, DONE, ROUND_TIMEOUT,
};

pub const RANDOMNESS_TRANSACTION_SUBMISSION_ROUND: RoundId =
    RoundId::new_static("RandomnessTransactionSubmissionRound");
pub const SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND: RoundId =
    RoundId::new_static("SelectKeeperTransactionSubmissionRound");
pub const VALIDATE_TRANSACTION_ROUND: RoundId = RoundId::new_static("ValidateTransactionRound");
pub const FINISHED_TRANSACTION_SUBMISSION_ROUND: RoundId =
    RoundId::new_static("FinishedTransactionSubmissionRound");
pub const FAILED_ROUND: RoundId = RoundId::new_static("FailedRound");

pub const NEGATIVE: Event = Event::new_static("NEGATIVE");

pub const MOST_VOTED_RANDOMNESS: &str = "most_voted_randomness";
pub const MOST_VOTED_KEEPER_ADDRESS: &str = "most_voted_keeper_address";

pub const ROUND_TIMEOUT_DURATION: Duration = Duration::from_secs(30);

/// Ends with [`DONE`] if replicas agree on a transaction hash, and with [`NEGATIVE`] if they agree
/// on `null`.
#[derive(Clone, Debug)]
pub struct ValidateTransactionRound;

impl RoundLogic for ValidateTransactionRound {
    fn round_id(&self) -> RoundId {
        VALIDATE_TRANSACTION_ROUND
    }

    fn payload_attribute(&self) -> &str {
        FINAL_TX_HASH
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE, NEGATIVE]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let final_tx_hash: Option<String> = outcome.parse()?;
        match final_tx_hash {
            Some(_) => Ok((DataUpdates::new(), DONE)),
            None => Ok((DataUpdates::new(), NEGATIVE)),
        }
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    AbciApp::new(
        AbciAppSpec::builder()
            .name("TransactionSubmissionAbciApp")
            .initial_round(RANDOMNESS_TRANSACTION_SUBMISSION_ROUND)
            .rounds(BTreeMap::from([
                (
                    RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                    RoundKind::agreement(CollectSameRound::new(
                        RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                        MOST_VOTED_RANDOMNESS,
                        DONE,
                    )),
                ),
                (
                    SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                    RoundKind::agreement(CollectSameRound::new(
                        SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                        MOST_VOTED_KEEPER_ADDRESS,
                        DONE,
                    )),
                ),
                (
                    VALIDATE_TRANSACTION_ROUND,
                    RoundKind::agreement(ValidateTransactionRound),
                ),
                (FINISHED_TRANSACTION_SUBMISSION_ROUND, RoundKind::Degenerate),
                (FAILED_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([
                (
                    RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                    edges([
                        (DONE, SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND),
                        (ROUND_TIMEOUT, RANDOMNESS_TRANSACTION_SUBMISSION_ROUND),
                    ]),
                ),
                (
                    SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND,
                    edges([
                        (DONE, VALIDATE_TRANSACTION_ROUND),
                        (ROUND_TIMEOUT, RANDOMNESS_TRANSACTION_SUBMISSION_ROUND),
                    ]),
                ),
                (
                    VALIDATE_TRANSACTION_ROUND,
                    edges([
                        (DONE, FINISHED_TRANSACTION_SUBMISSION_ROUND),
                        (NEGATIVE, FAILED_ROUND),
                        (ROUND_TIMEOUT, SELECT_KEEPER_TRANSACTION_SUBMISSION_ROUND),
                    ]),
                ),
            ]))
            .final_states(BTreeSet::from([
                FINISHED_TRANSACTION_SUBMISSION_ROUND,
                FAILED_ROUND,
            ]))
            .event_to_timeout(BTreeMap::from([(ROUND_TIMEOUT, ROUND_TIMEOUT_DURATION)]))
            .db_pre_conditions(BTreeMap::from([(
                RANDOMNESS_TRANSACTION_SUBMISSION_ROUND,
                keys([MOST_VOTED_TX_HASH]),
            )]))
            .db_post_conditions(BTreeMap::from([
                (
                    FINISHED_TRANSACTION_SUBMISSION_ROUND,
                    keys([MOST_VOTED_TX_HASH, FINAL_TX_HASH]),
                ),
                (FAILED_ROUND, BTreeSet::new()),
            ]))
            .build(),
    )
}

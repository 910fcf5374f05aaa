/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The executor side of an atomic swap: it supplies liquidity to an accepted RFQ, then claims the
//! buyer's side or refunds its own.
//!
//! ```text
//! CollectExchangeDataRound ─DONE─▶ AwaitRFQsRound ─QUOTE_ACCEPTED─▶ PrepareSupplyTransactionRound
//! AwaitBuyerTransactionsRound ─DONE─▶ PrepareClaimTransactionsRound
//! AwaitBuyerTransactionsRound ─RFQ_EXPIRED─▶ PrepareRefundTransactionsRound
//! ```
//!
//! Every prepare round hands its transaction off through a `Finalised*` round, and the swap resumes
//! at [`POST_TRANSACTION_ROUND`] once the transaction has settled.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    abci_app::{AbciApp, AbciAppError, AbciAppSpec},
    rounds::{AgreedOutcome, RoundError, RoundKind, RoundLogic},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::{Event, RoundId},
};

use super::{
    edges, keys,
    registration::PARTICIPANTS,
    swap::{
        AwaitCounterPartyRound, PostTransactionRound, PrepareTransactionRound, TxState, FINALISED,
        FINAL_TX_HASH, MOST_VOTED_TX_HASH, POST_CLAIM, POST_NEW_SWAP, POST_REFUND, TX_STATE,
    },
    CollectSameRound, DONE,
};

pub const COLLECT_EXCHANGE_DATA_ROUND: RoundId = RoundId::new_static("CollectExchangeDataRound");
pub const AWAIT_RFQS_ROUND: RoundId = RoundId::new_static("AwaitRFQsRound");
pub const PREPARE_SUPPLY_TRANSACTION_ROUND: RoundId =
    RoundId::new_static("PrepareSupplyTransactionRound");
pub const AWAIT_BUYER_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("AwaitBuyerTransactionsRound");
pub const PREPARE_CLAIM_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("PrepareClaimTransactionsRound");
pub const PREPARE_REFUND_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("PrepareRefundTransactionsRound");
pub const POST_TRANSACTION_ROUND: RoundId = RoundId::new_static("PostTransactionRound");

pub const SUCCESSFUL_EXECUTION_ROUND: RoundId = RoundId::new_static("SuccessfulExecutionRound");
pub const UNSUCCESSFUL_EXECUTION_ROUND: RoundId =
    RoundId::new_static("UnSuccessfulExecutionRound");
pub const FINALISED_SUPPLY_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedSupplyTransactionsRound");
pub const FINALISED_CLAIM_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedClaimTransactionsRound");
pub const FINALISED_REFUND_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedRefundTransactionsRound");

pub const QUOTE_ACCEPTED: Event = Event::new_static("QUOTE_ACCEPTED");
pub const RFQ_EXPIRED: Event = Event::new_static("RFQ_EXPIRED");

pub const EXCHANGE_BALANCES: &str = "exchange_balances";
pub const ACCEPTED_QUOTE: &str = "accepted_quote";

/// Agrees on the executor's balances on its exchanges, and starts a fresh swap.
#[derive(Clone, Debug)]
pub struct CollectExchangeDataRound;

impl RoundLogic for CollectExchangeDataRound {
    fn round_id(&self) -> RoundId {
        COLLECT_EXCHANGE_DATA_ROUND
    }

    fn payload_attribute(&self) -> &str {
        EXCHANGE_BALANCES
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        _outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        Ok((TxState::PreTransaction.update(), DONE))
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    let rounds = BTreeMap::from([
        (
            COLLECT_EXCHANGE_DATA_ROUND,
            RoundKind::agreement(CollectExchangeDataRound),
        ),
        (
            AWAIT_RFQS_ROUND,
            RoundKind::agreement(CollectSameRound::new(
                AWAIT_RFQS_ROUND,
                ACCEPTED_QUOTE,
                QUOTE_ACCEPTED,
            )),
        ),
        (
            PREPARE_SUPPLY_TRANSACTION_ROUND,
            RoundKind::agreement(PrepareTransactionRound::new(
                PREPARE_SUPPLY_TRANSACTION_ROUND,
                TxState::PostNewSwap,
            )),
        ),
        (
            AWAIT_BUYER_TRANSACTIONS_ROUND,
            RoundKind::agreement(AwaitCounterPartyRound::new(
                AWAIT_BUYER_TRANSACTIONS_ROUND,
                RFQ_EXPIRED,
            )),
        ),
        (
            PREPARE_CLAIM_TRANSACTIONS_ROUND,
            RoundKind::agreement(PrepareTransactionRound::new(
                PREPARE_CLAIM_TRANSACTIONS_ROUND,
                TxState::PostClaim,
            )),
        ),
        (
            PREPARE_REFUND_TRANSACTIONS_ROUND,
            RoundKind::agreement(PrepareTransactionRound::new(
                PREPARE_REFUND_TRANSACTIONS_ROUND,
                TxState::PostRefund,
            )),
        ),
        (
            POST_TRANSACTION_ROUND,
            RoundKind::agreement(PostTransactionRound::new(POST_TRANSACTION_ROUND)),
        ),
        (SUCCESSFUL_EXECUTION_ROUND, RoundKind::Degenerate),
        (UNSUCCESSFUL_EXECUTION_ROUND, RoundKind::Degenerate),
        (FINALISED_SUPPLY_TRANSACTIONS_ROUND, RoundKind::Degenerate),
        (FINALISED_CLAIM_TRANSACTIONS_ROUND, RoundKind::Degenerate),
        (FINALISED_REFUND_TRANSACTIONS_ROUND, RoundKind::Degenerate),
    ]);

    let transition_function = BTreeMap::from([
        (
            AWAIT_BUYER_TRANSACTIONS_ROUND,
            edges([
                (DONE, PREPARE_CLAIM_TRANSACTIONS_ROUND),
                (RFQ_EXPIRED, PREPARE_REFUND_TRANSACTIONS_ROUND),
            ]),
        ),
        (
            AWAIT_RFQS_ROUND,
            edges([(QUOTE_ACCEPTED, PREPARE_SUPPLY_TRANSACTION_ROUND)]),
        ),
        (COLLECT_EXCHANGE_DATA_ROUND, edges([(DONE, AWAIT_RFQS_ROUND)])),
        (
            POST_TRANSACTION_ROUND,
            edges([
                (POST_CLAIM, SUCCESSFUL_EXECUTION_ROUND),
                (POST_NEW_SWAP, AWAIT_BUYER_TRANSACTIONS_ROUND),
                (POST_REFUND, UNSUCCESSFUL_EXECUTION_ROUND),
            ]),
        ),
        (
            PREPARE_CLAIM_TRANSACTIONS_ROUND,
            edges([
                (DONE, FINALISED_CLAIM_TRANSACTIONS_ROUND),
                (FINALISED, SUCCESSFUL_EXECUTION_ROUND),
            ]),
        ),
        (
            PREPARE_REFUND_TRANSACTIONS_ROUND,
            edges([
                (DONE, FINALISED_REFUND_TRANSACTIONS_ROUND),
                (FINALISED, UNSUCCESSFUL_EXECUTION_ROUND),
            ]),
        ),
        (
            PREPARE_SUPPLY_TRANSACTION_ROUND,
            edges([
                (DONE, FINALISED_SUPPLY_TRANSACTIONS_ROUND),
                (FINALISED, AWAIT_BUYER_TRANSACTIONS_ROUND),
            ]),
        ),
    ]);

    let handed_off = keys([MOST_VOTED_TX_HASH, TX_STATE]);

    AbciApp::new(
        AbciAppSpec::builder()
            .name("QSExecutorAbciApp")
            .initial_round(POST_TRANSACTION_ROUND)
            .initial_states(BTreeSet::from([
                POST_TRANSACTION_ROUND,
                COLLECT_EXCHANGE_DATA_ROUND,
            ]))
            .rounds(rounds)
            .transition_function(transition_function)
            .final_states(BTreeSet::from([
                SUCCESSFUL_EXECUTION_ROUND,
                UNSUCCESSFUL_EXECUTION_ROUND,
                FINALISED_REFUND_TRANSACTIONS_ROUND,
                FINALISED_CLAIM_TRANSACTIONS_ROUND,
                FINALISED_SUPPLY_TRANSACTIONS_ROUND,
            ]))
            .db_pre_conditions(BTreeMap::from([
                (POST_TRANSACTION_ROUND, keys([FINAL_TX_HASH])),
                (COLLECT_EXCHANGE_DATA_ROUND, keys([PARTICIPANTS])),
            ]))
            .db_post_conditions(BTreeMap::from([
                (SUCCESSFUL_EXECUTION_ROUND, BTreeSet::new()),
                (UNSUCCESSFUL_EXECUTION_ROUND, BTreeSet::new()),
                (FINALISED_REFUND_TRANSACTIONS_ROUND, handed_off.clone()),
                (FINALISED_CLAIM_TRANSACTIONS_ROUND, handed_off.clone()),
                (FINALISED_SUPPLY_TRANSACTIONS_ROUND, handed_off),
            ]))
            .build(),
    )
}

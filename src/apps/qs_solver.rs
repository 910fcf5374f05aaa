/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The solver side of an atomic swap: it turns a trading opportunity into an RFQ, accepts a quote,
//! opens the swap, then claims the supplier's side or refunds its own.
//!
//! If replicas agree that there is no opportunity, or that nobody quoted, the app ends in
//! [`NO_OPPORTUNITY_ROUND`] without touching the chain. Otherwise, like the
//! [executor](super::qs_executor), every transaction goes through a `Finalised*` round and the swap
//! resumes at [`POST_TRANSACTION_ROUND`].

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

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

pub const AWAITING_OPPORTUNITY_ROUND: RoundId = RoundId::new_static("AwaitingOpportunityRound");
pub const SUBMIT_RFQ_ROUND: RoundId = RoundId::new_static("SubmitRFQRound");
pub const AWAIT_QUOTES_ROUND: RoundId = RoundId::new_static("AwaitQuotesRound");
pub const SELECT_QUOTES_ROUND: RoundId = RoundId::new_static("SelectQuotesRound");
pub const PREPARE_NEW_SWAP_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("PrepareNewSwapTransactionsRound");
pub const AWAIT_SUPPLIER_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("AwaitSupplierTransactionsRound");
pub const PREPARE_CLAIM_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("PrepareClaimTransactionsRound");
pub const PREPARE_REFUND_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("PrepareRefundTransactionsRound");
pub const POST_TRANSACTION_ROUND: RoundId = RoundId::new_static("PostTransactionRound");

pub const NO_OPPORTUNITY_ROUND: RoundId = RoundId::new_static("NoOpportunityRound");
pub const SUCCESSFUL_EXECUTION_ROUND: RoundId =
    RoundId::new_static("SuccessfulExecutionRound");
pub const UNSUCCESSFUL_EXECUTION_ROUND: RoundId =
    RoundId::new_static("UnSuccessfulExecutionRound");
pub const FINALISED_SWAP_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedSwapTransactionsRound");
pub const FINALISED_CLAIM_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedClaimTransactionsRound");
pub const FINALISED_REFUND_TRANSACTIONS_ROUND: RoundId =
    RoundId::new_static("FinalisedRefundTransactionsRound");

pub const TRIGGERED: Event = Event::new_static("TRIGGERED");
pub const NOT_TRIGGERED: Event = Event::new_static("NOT_TRIGGERED");
pub const QUOTES: Event = Event::new_static("QUOTES");
pub const NO_QUOTES: Event = Event::new_static("NO_QUOTES");
pub const ACCEPT_QUOTES: Event = Event::new_static("ACCEPT_QUOTES");
pub const COUNTER_PARTY_TIMEOUT: Event = Event::new_static("COUNTER_PARTY_TIMEOUT");

pub const OPPORTUNITY: &str = "opportunity";
pub const RFQ: &str = "rfq";
pub const RECEIVED_QUOTES: &str = "quotes";
pub const SELECTED_QUOTE: &str = "selected_quote";

/// Agrees on the current trading opportunity, or `null` if there is none, and starts a fresh swap.
#[derive(Clone, Debug)]
pub struct AwaitingOpportunityRound;

impl RoundLogic for AwaitingOpportunityRound {
    fn round_id(&self) -> RoundId {
        AWAITING_OPPORTUNITY_ROUND
    }

    fn payload_attribute(&self) -> &str {
        OPPORTUNITY
    }

    fn events(&self) -> Vec<Event> {
        vec![TRIGGERED, NOT_TRIGGERED]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let event = if outcome.content.value().is_null() {
            NOT_TRIGGERED
        } else {
            TRIGGERED
        };
        Ok((TxState::PreTransaction.update(), event))
    }
}

/// Agrees on the quotes received for the RFQ. Anything other than a non-empty list means nobody
/// quoted.
#[derive(Clone, Debug)]
pub struct AwaitQuotesRound;

impl RoundLogic for AwaitQuotesRound {
    fn round_id(&self) -> RoundId {
        AWAIT_QUOTES_ROUND
    }

    fn payload_attribute(&self) -> &str {
        RECEIVED_QUOTES
    }

    fn events(&self) -> Vec<Event> {
        vec![QUOTES, NO_QUOTES]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let event = match outcome.content.value() {
            Value::Array(quotes) if !quotes.is_empty() => QUOTES,
            _ => NO_QUOTES,
        };
        Ok((DataUpdates::new(), event))
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    let rounds = BTreeMap::from([
        (
            AWAITING_OPPORTUNITY_ROUND,
            RoundKind::agreement(AwaitingOpportunityRound),
        ),
        (
            SUBMIT_RFQ_ROUND,
            RoundKind::agreement(CollectSameRound::new(SUBMIT_RFQ_ROUND, RFQ, DONE)),
        ),
        (AWAIT_QUOTES_ROUND, RoundKind::agreement(AwaitQuotesRound)),
        (
            SELECT_QUOTES_ROUND,
            RoundKind::agreement(CollectSameRound::new(
                SELECT_QUOTES_ROUND,
                SELECTED_QUOTE,
                ACCEPT_QUOTES,
            )),
        ),
        (
            PREPARE_NEW_SWAP_TRANSACTIONS_ROUND,
            RoundKind::agreement(PrepareTransactionRound::new(
                PREPARE_NEW_SWAP_TRANSACTIONS_ROUND,
                TxState::PostNewSwap,
            )),
        ),
        (
            AWAIT_SUPPLIER_TRANSACTIONS_ROUND,
            RoundKind::agreement(AwaitCounterPartyRound::new(
                AWAIT_SUPPLIER_TRANSACTIONS_ROUND,
                COUNTER_PARTY_TIMEOUT,
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
        (NO_OPPORTUNITY_ROUND, RoundKind::Degenerate),
        (SUCCESSFUL_EXECUTION_ROUND, RoundKind::Degenerate),
        (UNSUCCESSFUL_EXECUTION_ROUND, RoundKind::Degenerate),
        (FINALISED_SWAP_TRANSACTIONS_ROUND, RoundKind::Degenerate),
        (FINALISED_CLAIM_TRANSACTIONS_ROUND, RoundKind::Degenerate),
        (FINALISED_REFUND_TRANSACTIONS_ROUND, RoundKind::Degenerate),
    ]);

    let transition_function = BTreeMap::from([
        (
            AWAIT_QUOTES_ROUND,
            edges([(NO_QUOTES, NO_OPPORTUNITY_ROUND), (QUOTES, SELECT_QUOTES_ROUND)]),
        ),
        (
            AWAIT_SUPPLIER_TRANSACTIONS_ROUND,
            edges([
                (COUNTER_PARTY_TIMEOUT, PREPARE_REFUND_TRANSACTIONS_ROUND),
                (DONE, PREPARE_CLAIM_TRANSACTIONS_ROUND),
            ]),
        ),
        (
            AWAITING_OPPORTUNITY_ROUND,
            edges([
                (NOT_TRIGGERED, NO_OPPORTUNITY_ROUND),
                (TRIGGERED, SUBMIT_RFQ_ROUND),
            ]),
        ),
        (
            POST_TRANSACTION_ROUND,
            edges([
                (POST_CLAIM, SUCCESSFUL_EXECUTION_ROUND),
                (POST_NEW_SWAP, AWAIT_SUPPLIER_TRANSACTIONS_ROUND),
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
            PREPARE_NEW_SWAP_TRANSACTIONS_ROUND,
            edges([
                (DONE, FINALISED_SWAP_TRANSACTIONS_ROUND),
                (FINALISED, AWAIT_SUPPLIER_TRANSACTIONS_ROUND),
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
            SELECT_QUOTES_ROUND,
            edges([(ACCEPT_QUOTES, PREPARE_NEW_SWAP_TRANSACTIONS_ROUND)]),
        ),
        (SUBMIT_RFQ_ROUND, edges([(DONE, AWAIT_QUOTES_ROUND)])),
    ]);

    let handed_off = keys([MOST_VOTED_TX_HASH, TX_STATE]);

    AbciApp::new(
        AbciAppSpec::builder()
            .name("QSSolverAbciApp")
            .initial_round(POST_TRANSACTION_ROUND)
            .initial_states(BTreeSet::from([
                POST_TRANSACTION_ROUND,
                AWAITING_OPPORTUNITY_ROUND,
            ]))
            .rounds(rounds)
            .transition_function(transition_function)
            .final_states(BTreeSet::from([
                NO_OPPORTUNITY_ROUND,
                SUCCESSFUL_EXECUTION_ROUND,
                UNSUCCESSFUL_EXECUTION_ROUND,
                FINALISED_SWAP_TRANSACTIONS_ROUND,
                FINALISED_CLAIM_TRANSACTIONS_ROUND,
                FINALISED_REFUND_TRANSACTIONS_ROUND,
            ]))
            .db_pre_conditions(BTreeMap::from([
                (POST_TRANSACTION_ROUND, keys([FINAL_TX_HASH])),
                (AWAITING_OPPORTUNITY_ROUND, keys([PARTICIPANTS])),
            ]))
            .db_post_conditions(BTreeMap::from([
                (NO_OPPORTUNITY_ROUND, BTreeSet::new()),
                (SUCCESSFUL_EXECUTION_ROUND, BTreeSet::new()),
                (UNSUCCESSFUL_EXECUTION_ROUND, BTreeSet::new()),
                (FINALISED_SWAP_TRANSACTIONS_ROUND, handed_off.clone()),
                (FINALISED_CLAIM_TRANSACTIONS_ROUND, handed_off.clone()),
                (FINALISED_REFUND_TRANSACTIONS_ROUND, handed_off),
            ]))
            .build(),
    )
}

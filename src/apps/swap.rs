/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Round logic shared by the executor and the solver sides of an atomic swap.
//!
//! Both sides thread a [`TxState`] through the synchronized data under [`TX_STATE`]. A prepare
//! round sets it just before its transaction is handed to transaction settlement, and
//! [`PostTransactionRound`] reads it once the transaction has settled, to decide which branch of
//! the swap to continue on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    rounds::{AgreedOutcome, RoundError, RoundLogic},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::{Event, RoundId},
};

use super::DONE;

pub const TX_STATE: &str = "tx_state";
pub const MOST_VOTED_TX_HASH: &str = "most_voted_tx_hash";
pub const FINAL_TX_HASH: &str = "final_tx_hash";
pub const COUNTER_PARTY_TIMEOUT_KEY: &str = "counter_party_timeout";

pub const FINALISED: Event = Event::new_static("FINALISED");
pub const POST_NEW_SWAP: Event = Event::new_static("POST_NEW_SWAP");
pub const POST_CLAIM: Event = Event::new_static("POST_CLAIM");
pub const POST_REFUND: Event = Event::new_static("POST_REFUND");

/// Which swap transaction, if any, is waiting to be acknowledged after settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    PreTransaction,
    PostNewSwap,
    PostClaim,
    PostRefund,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::PreTransaction => "pre_transaction",
            TxState::PostNewSwap => "post_new_swap",
            TxState::PostClaim => "post_claim",
            TxState::PostRefund => "post_refund",
        }
    }

    pub fn to_value(self) -> Value {
        Value::String(self.as_str().to_string())
    }

    pub fn update(self) -> DataUpdates {
        DataUpdates::new().with(TX_STATE, self.to_value())
    }
}

/// Read the tx state from `data`. A missing or unrecognised value is a fatal error of `round_id`.
pub fn read_tx_state(round_id: &RoundId, data: &SynchronizedData) -> Result<TxState, RoundError> {
    let value = data
        .get(TX_STATE)
        .ok_or_else(|| RoundError::UnexpectedTxState {
            round_id: round_id.clone(),
            tx_state: "<missing>".to_string(),
        })?;
    TxState::deserialize(value).map_err(|_| RoundError::UnexpectedTxState {
        round_id: round_id.clone(),
        tx_state: value.to_string(),
    })
}

/// Logic of a round that agrees on a transaction hash for transaction settlement.
///
/// If the tx state already is `target`, the transaction has been settled before and the round ends
/// with [`FINALISED`]. Otherwise it sets the tx state to `target` and ends with [`DONE`].
#[derive(Clone, Debug)]
pub struct PrepareTransactionRound {
    round_id: RoundId,
    target: TxState,
}

impl PrepareTransactionRound {
    pub const fn new(round_id: RoundId, target: TxState) -> Self {
        Self { round_id, target }
    }
}

impl RoundLogic for PrepareTransactionRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        MOST_VOTED_TX_HASH
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE, FINALISED]
    }

    fn end_block(
        &self,
        data: &SynchronizedData,
        _outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        if data.get(TX_STATE) == Some(&self.target.to_value()) {
            Ok((DataUpdates::new(), FINALISED))
        } else {
            Ok((self.target.update(), DONE))
        }
    }
}

/// Logic of the round that acknowledges a settled transaction. It is total over [`TxState`]:
/// `pre_transaction`, a missing tx state, and unrecognised values all mean the graph and the data
/// have drifted apart, and are fatal.
#[derive(Clone, Debug)]
pub struct PostTransactionRound {
    round_id: RoundId,
}

impl PostTransactionRound {
    pub const fn new(round_id: RoundId) -> Self {
        Self { round_id }
    }
}

impl RoundLogic for PostTransactionRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        FINAL_TX_HASH
    }

    fn events(&self) -> Vec<Event> {
        vec![POST_NEW_SWAP, POST_CLAIM, POST_REFUND]
    }

    fn end_block(
        &self,
        data: &SynchronizedData,
        _outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let event = match read_tx_state(&self.round_id, data)? {
            TxState::PostNewSwap => POST_NEW_SWAP,
            TxState::PostClaim => POST_CLAIM,
            TxState::PostRefund => POST_REFUND,
            TxState::PreTransaction => {
                return Err(RoundError::UnexpectedTxState {
                    round_id: self.round_id.clone(),
                    tx_state: TxState::PreTransaction.as_str().to_string(),
                })
            }
        };
        Ok((DataUpdates::new(), event))
    }
}

/// Logic of a round that waits for the counter party's side of the swap.
///
/// Replicas agree on whether the counter party has timed out. If it has, the round ends with
/// `timeout_event` and the swap is refunded; otherwise it ends with [`DONE`] and the swap is claimed.
#[derive(Clone, Debug)]
pub struct AwaitCounterPartyRound {
    round_id: RoundId,
    timeout_event: Event,
}

impl AwaitCounterPartyRound {
    pub const fn new(round_id: RoundId, timeout_event: Event) -> Self {
        Self {
            round_id,
            timeout_event,
        }
    }
}

impl RoundLogic for AwaitCounterPartyRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        COUNTER_PARTY_TIMEOUT_KEY
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE, self.timeout_event.clone()]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let timed_out: bool = outcome.parse()?;
        let event = if timed_out {
            self.timeout_event.clone()
        } else {
            DONE
        };
        Ok((DataUpdates::new(), event))
    }
}

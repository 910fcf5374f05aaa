/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The concrete apps of the swap execution and orchestration agents, and their compositions.
//!
//! Each app module exposes the ids of its rounds as constants, the [`RoundLogic`] of each of its
//! agreement rounds, and an `abci_app()` function that builds and validates its transition graph.
//!
//! | Module | App |
//! |---|---|
//! | [`registration`] | Agrees on the set of participants. |
//! | [`transaction_settlement`] | Selects a keeper and validates a settled transaction. |
//! | [`reset_pause`] | Opens a new period. |
//! | [`qs_executor`] | Supplies liquidity to accepted RFQs, then claims or refunds. |
//! | [`qs_solver`] | Turns opportunities into RFQs and swaps, then claims or refunds. |
//! | [`orchestrator`] | Keeps a deployment healthy. |
//! | [`ui_loader`] | Loads and health-checks a UI component. |
//!
//! [`compositions`] chains these apps into the full consensus loop of each agent.

pub mod compositions;

pub mod orchestrator;

pub mod qs_executor;

pub mod qs_solver;

pub mod registration;

pub mod reset_pause;

pub mod swap;

pub mod transaction_settlement;

pub mod ui_loader;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    rounds::{AgreedOutcome, RoundError, RoundLogic},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::{Event, RoundId},
};

pub const DONE: Event = Event::new_static("DONE");
pub const ERROR: Event = Event::new_static("ERROR");
pub const ROUND_TIMEOUT: Event = Event::new_static("ROUND_TIMEOUT");
pub const NO_MAJORITY: Event = Event::new_static("NO_MAJORITY");

/// Logic of a round that only records the agreed content and always ends with the same event.
#[derive(Clone, Debug)]
pub struct CollectSameRound {
    round_id: RoundId,
    payload_attribute: &'static str,
    event: Event,
}

impl CollectSameRound {
    pub const fn new(round_id: RoundId, payload_attribute: &'static str, event: Event) -> Self {
        Self {
            round_id,
            payload_attribute,
            event,
        }
    }
}

impl RoundLogic for CollectSameRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        self.payload_attribute
    }

    fn events(&self) -> Vec<Event> {
        vec![self.event.clone()]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        _outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        Ok((DataUpdates::new(), self.event.clone()))
    }
}

pub(crate) fn edges<const N: usize>(edges: [(Event, RoundId); N]) -> BTreeMap<Event, RoundId> {
    BTreeMap::from(edges)
}

pub(crate) fn keys<const N: usize>(keys: [&str; N]) -> BTreeSet<String> {
    keys.into_iter().map(str::to_string).collect()
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reset and pause: closes the current period of the synchronized data and opens the next one.
//!
//! Replicas submit the number of the period they expect to move to. If they agree on the period that
//! follows the current one, the round opens it and ends with [`DONE`]; otherwise it ends with
//! [`NO_MAJORITY`] and the period stays open.

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

use super::{edges, DONE, NO_MAJORITY};

pub const RESET_AND_PAUSE_ROUND: RoundId = RoundId::new_static("ResetAndPauseRound");
pub const FINISHED_RESET_AND_PAUSE_ROUND: RoundId =
    RoundId::new_static("FinishedResetAndPauseRound");
pub const FINISHED_RESET_AND_PAUSE_ERROR_ROUND: RoundId =
    RoundId::new_static("FinishedResetAndPauseErrorRound");

pub const RESET_AND_PAUSE_TIMEOUT: Event = Event::new_static("RESET_AND_PAUSE_TIMEOUT");
pub const RESET_AND_PAUSE_TIMEOUT_DURATION: Duration = Duration::from_secs(30);

pub const NEXT_PERIOD: &str = "next_period";

#[derive(Clone, Debug)]
pub struct ResetAndPauseRound;

impl RoundLogic for ResetAndPauseRound {
    fn round_id(&self) -> RoundId {
        RESET_AND_PAUSE_ROUND
    }

    fn payload_attribute(&self) -> &str {
        NEXT_PERIOD
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE, NO_MAJORITY]
    }

    fn end_block(
        &self,
        data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let next_period: u64 = outcome.parse()?;
        if next_period == data.period().next().int() {
            Ok((DataUpdates::new(), DONE))
        } else {
            Ok((DataUpdates::new(), NO_MAJORITY))
        }
    }

    fn opens_new_period(&self, event: &Event) -> bool {
        *event == DONE
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    AbciApp::new(
        AbciAppSpec::builder()
            .name("ResetPauseAbciApp")
            .initial_round(RESET_AND_PAUSE_ROUND)
            .rounds(BTreeMap::from([
                (RESET_AND_PAUSE_ROUND, RoundKind::agreement(ResetAndPauseRound)),
                (FINISHED_RESET_AND_PAUSE_ROUND, RoundKind::Degenerate),
                (FINISHED_RESET_AND_PAUSE_ERROR_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([(
                RESET_AND_PAUSE_ROUND,
                edges([
                    (DONE, FINISHED_RESET_AND_PAUSE_ROUND),
                    (NO_MAJORITY, FINISHED_RESET_AND_PAUSE_ERROR_ROUND),
                    (RESET_AND_PAUSE_TIMEOUT, FINISHED_RESET_AND_PAUSE_ERROR_ROUND),
                ]),
            )]))
            .final_states(BTreeSet::from([
                FINISHED_RESET_AND_PAUSE_ROUND,
                FINISHED_RESET_AND_PAUSE_ERROR_ROUND,
            ]))
            .event_to_timeout(BTreeMap::from([(
                RESET_AND_PAUSE_TIMEOUT,
                RESET_AND_PAUSE_TIMEOUT_DURATION,
            )]))
            .db_pre_conditions(BTreeMap::from([(RESET_AND_PAUSE_ROUND, BTreeSet::new())]))
            .db_post_conditions(BTreeMap::from([
                (FINISHED_RESET_AND_PAUSE_ROUND, BTreeSet::new()),
                (FINISHED_RESET_AND_PAUSE_ERROR_ROUND, BTreeSet::new()),
            ]))
            .build(),
    )
}

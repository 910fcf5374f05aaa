/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Component loading: replicas agree on the setup of a UI component, then on its health check.
//!
//! A setup or health check that reports an error, or that takes longer than
//! [`ROUND_TIMEOUT_DURATION`], sends the app to [`ERROR_ROUND`], where replicas agree on the error
//! before setting up again.

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

use super::{edges, CollectSameRound, DONE, ERROR, ROUND_TIMEOUT};

pub const SETUP_ROUND: RoundId = RoundId::new_static("SetupRound");
pub const HEALTHCHECK_ROUND: RoundId = RoundId::new_static("HealthcheckRound");
pub const ERROR_ROUND: RoundId = RoundId::new_static("ErrorRound");
pub const DONE_ROUND: RoundId = RoundId::new_static("DoneRound");

pub const SETUP_DATA: &str = "setup_data";
pub const HEALTHCHECK_DATA: &str = "healthcheck_data";
pub const ERROR_DATA: &str = "error_data";

pub const ROUND_TIMEOUT_DURATION: Duration = Duration::from_secs(30);

/// Logic of a round whose agreed content reports an error as an object with an `"error"` field.
#[derive(Clone, Debug)]
pub struct ComponentReportRound {
    round_id: RoundId,
    payload_attribute: &'static str,
}

impl ComponentReportRound {
    pub const fn new(round_id: RoundId, payload_attribute: &'static str) -> Self {
        Self {
            round_id,
            payload_attribute,
        }
    }
}

impl RoundLogic for ComponentReportRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        self.payload_attribute
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE, ERROR]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let failed = outcome
            .content
            .value()
            .as_object()
            .is_some_and(|report| report.contains_key("error"));
        let event = if failed { ERROR } else { DONE };
        Ok((DataUpdates::new(), event))
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    AbciApp::new(
        AbciAppSpec::builder()
            .name("ComponentLoadingAbciApp")
            .initial_round(SETUP_ROUND)
            .initial_states(BTreeSet::from([SETUP_ROUND, HEALTHCHECK_ROUND]))
            .rounds(BTreeMap::from([
                (
                    SETUP_ROUND,
                    RoundKind::agreement(ComponentReportRound::new(SETUP_ROUND, SETUP_DATA)),
                ),
                (
                    HEALTHCHECK_ROUND,
                    RoundKind::agreement(ComponentReportRound::new(
                        HEALTHCHECK_ROUND,
                        HEALTHCHECK_DATA,
                    )),
                ),
                (
                    ERROR_ROUND,
                    RoundKind::agreement(CollectSameRound::new(ERROR_ROUND, ERROR_DATA, DONE)),
                ),
                (DONE_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([
                (
                    SETUP_ROUND,
                    edges([
                        (DONE, HEALTHCHECK_ROUND),
                        (ERROR, ERROR_ROUND),
                        (ROUND_TIMEOUT, ERROR_ROUND),
                    ]),
                ),
                (
                    HEALTHCHECK_ROUND,
                    edges([
                        (DONE, DONE_ROUND),
                        (ERROR, ERROR_ROUND),
                        (ROUND_TIMEOUT, ERROR_ROUND),
                    ]),
                ),
                (ERROR_ROUND, edges([(DONE, SETUP_ROUND)])),
            ]))
            .final_states(BTreeSet::from([DONE_ROUND]))
            .event_to_timeout(BTreeMap::from([(ROUND_TIMEOUT, ROUND_TIMEOUT_DURATION)]))
            .db_pre_conditions(BTreeMap::from([
                (SETUP_ROUND, BTreeSet::new()),
                (HEALTHCHECK_ROUND, BTreeSet::new()),
            ]))
            .db_post_conditions(BTreeMap::from([(DONE_ROUND, BTreeSet::new())]))
            .build(),
    )
}

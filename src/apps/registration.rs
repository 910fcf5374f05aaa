/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Agent registration: replicas agree on the list of participants of the service.
//!
//! The agreed list is stored under [`PARTICIPANTS`], which is persisted across periods.

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

use super::{edges, keys, DONE, ROUND_TIMEOUT};

pub const REGISTRATION_STARTUP_ROUND: RoundId = RoundId::new_static("RegistrationStartupRound");
pub const REGISTRATION_ROUND: RoundId = RoundId::new_static("RegistrationRound");
pub const FINISHED_REGISTRATION_ROUND: RoundId = RoundId::new_static("FinishedRegistrationRound");

pub const PARTICIPANTS: &str = "participants";

pub const ROUND_TIMEOUT_DURATION: Duration = Duration::from_secs(30);

/// Agree on a non-empty list of participant names.
#[derive(Clone, Debug)]
pub struct RegistrationRound {
    round_id: RoundId,
}

impl RegistrationRound {
    pub const fn new(round_id: RoundId) -> Self {
        Self { round_id }
    }
}

impl RoundLogic for RegistrationRound {
    fn round_id(&self) -> RoundId {
        self.round_id.clone()
    }

    fn payload_attribute(&self) -> &str {
        PARTICIPANTS
    }

    fn events(&self) -> Vec<Event> {
        vec![DONE]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let participants: Vec<String> = outcome.parse()?;
        if participants.is_empty() {
            return Err(RoundError::InvalidContent {
                round_id: self.round_id.clone(),
                reason: "the list of participants is empty".to_string(),
            });
        }
        Ok((DataUpdates::new(), DONE))
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    AbciApp::new(
        AbciAppSpec::builder()
            .name("AgentRegistrationAbciApp")
            .initial_round(REGISTRATION_STARTUP_ROUND)
            .initial_states(BTreeSet::from([
                REGISTRATION_STARTUP_ROUND,
                REGISTRATION_ROUND,
            ]))
            .rounds(BTreeMap::from([
                (
                    REGISTRATION_STARTUP_ROUND,
                    RoundKind::agreement(RegistrationRound::new(REGISTRATION_STARTUP_ROUND)),
                ),
                (
                    REGISTRATION_ROUND,
                    RoundKind::agreement(RegistrationRound::new(REGISTRATION_ROUND)),
                ),
                (FINISHED_REGISTRATION_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([
                (
                    REGISTRATION_STARTUP_ROUND,
                    edges([
                        (DONE, FINISHED_REGISTRATION_ROUND),
                        (ROUND_TIMEOUT, REGISTRATION_STARTUP_ROUND),
                    ]),
                ),
                (
                    REGISTRATION_ROUND,
                    edges([
                        (DONE, FINISHED_REGISTRATION_ROUND),
                        (ROUND_TIMEOUT, REGISTRATION_ROUND),
                    ]),
                ),
            ]))
            .final_states(BTreeSet::from([FINISHED_REGISTRATION_ROUND]))
            .event_to_timeout(BTreeMap::from([(ROUND_TIMEOUT, ROUND_TIMEOUT_DURATION)]))
            .db_pre_conditions(BTreeMap::from([
                (REGISTRATION_STARTUP_ROUND, BTreeSet::new()),
                (REGISTRATION_ROUND, BTreeSet::new()),
            ]))
            .db_post_conditions(BTreeMap::from([(
                FINISHED_REGISTRATION_ROUND,
                keys([PARTICIPANTS]),
            )]))
            .cross_period_persisted_keys(keys([PARTICIPANTS]))
            .build(),
    )
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deployment orchestration: replicas agree on whether the deployment is healthy, and on the
//! containers to create when it is not.
//!
//! Two variants of the app exist. [`abci_app`] can be entered on its own. [`qs_abci_app`] expects the
//! participants to have been registered, and is the one chained into the
//! [orchestrator composite](super::compositions::orchestrator_composite).

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    abci_app::{AbciApp, AbciAppError, AbciAppSpec, DataConditions},
    rounds::{AgreedOutcome, RoundError, RoundKind, RoundLogic},
    synchronized_data::{DataUpdates, SynchronizedData},
    types::basic::{Event, RoundId},
};

use super::{edges, keys, registration::PARTICIPANTS, CollectSameRound, DONE};

pub const HEALTH_CHECK_ROUND: RoundId = RoundId::new_static("HealthCheckRound");
pub const CREATE_CONTAINERS_ROUND: RoundId = RoundId::new_static("CreateContainersRound");
pub const SUCCESSFUL_DEPLOYMENT_ROUND: RoundId = RoundId::new_static("SuccessfulDeploymentRound");

pub const HEALTHY: Event = Event::new_static("HEALTHY");
pub const UNHEALTHY: Event = Event::new_static("UNHEALTHY");

pub const HEALTH_CHECK: &str = "health_check";
pub const CONTAINERS: &str = "containers";

/// Replicas agree on `true` if every container of the deployment is up.
#[derive(Clone, Debug)]
pub struct HealthCheckRound;

impl RoundLogic for HealthCheckRound {
    fn round_id(&self) -> RoundId {
        HEALTH_CHECK_ROUND
    }

    fn payload_attribute(&self) -> &str {
        HEALTH_CHECK
    }

    fn events(&self) -> Vec<Event> {
        vec![HEALTHY, UNHEALTHY]
    }

    fn end_block(
        &self,
        _data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError> {
        let healthy: bool = outcome.parse()?;
        let event = if healthy { HEALTHY } else { UNHEALTHY };
        Ok((DataUpdates::new(), event))
    }
}

pub fn abci_app() -> Result<AbciApp, AbciAppError> {
    build("OrchestratorAbciApp", BTreeSet::new())
}

pub fn qs_abci_app() -> Result<AbciApp, AbciAppError> {
    build("QSOrchestratorAbciApp", keys([PARTICIPANTS]))
}

fn build(name: &str, health_check_pre_conditions: BTreeSet<String>) -> Result<AbciApp, AbciAppError> {
    let db_pre_conditions: DataConditions =
        BTreeMap::from([(HEALTH_CHECK_ROUND, health_check_pre_conditions)]);

    AbciApp::new(
        AbciAppSpec::builder()
            .name(name)
            .initial_round(HEALTH_CHECK_ROUND)
            .rounds(BTreeMap::from([
                (HEALTH_CHECK_ROUND, RoundKind::agreement(HealthCheckRound)),
                (
                    CREATE_CONTAINERS_ROUND,
                    RoundKind::agreement(CollectSameRound::new(
                        CREATE_CONTAINERS_ROUND,
                        CONTAINERS,
                        DONE,
                    )),
                ),
                (SUCCESSFUL_DEPLOYMENT_ROUND, RoundKind::Degenerate),
            ]))
            .transition_function(BTreeMap::from([
                (CREATE_CONTAINERS_ROUND, edges([(DONE, HEALTH_CHECK_ROUND)])),
                (
                    HEALTH_CHECK_ROUND,
                    edges([
                        (HEALTHY, SUCCESSFUL_DEPLOYMENT_ROUND),
                        (UNHEALTHY, CREATE_CONTAINERS_ROUND),
                    ]),
                ),
            ]))
            .final_states(BTreeSet::from([SUCCESSFUL_DEPLOYMENT_ROUND]))
            .db_pre_conditions(db_pre_conditions)
            .db_post_conditions(BTreeMap::from([(
                SUCCESSFUL_DEPLOYMENT_ROUND,
                BTreeSet::new(),
            )]))
            .build(),
    )
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Composition of independently defined [`AbciApp`]s into one.
//!
//! [`chain`] is a pure graph rewrite. Every final state named in the transition mapping keeps its
//! degenerate round, but gains a single edge labelled [`CHAIN_DONE`] to the round it is mapped to.
//! The [engine](super::engine) passes through such rounds immediately, so reaching the final state of
//! one app is indistinguishable from entering the mapped round of the next.
//!
//! Final states that the mapping does not name stay true terminals of the composed app.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::basic::{Event, RoundId};

use super::{AbciApp, AbciAppError, AbciAppSpec};

/// The event labelling the edge out of a final state that was mapped to another app's round.
pub const CHAIN_DONE: Event = Event::new_static("CHAIN_DONE");

/// Compose `apps` into a single app using `transition_mapping`, which maps final states of the apps
/// to the initial states they lead to.
///
/// The composed app is entered at the first app's initial round. Its initial states are those of the
/// first app, plus the initial states of the other apps that the mapping does not lead to.
pub fn chain(
    apps: &[AbciApp],
    transition_mapping: &BTreeMap<RoundId, RoundId>,
) -> Result<AbciApp, ChainError> {
    let first = apps.first().ok_or(ChainError::NoApps)?;

    // Which app every round belongs to.
    let mut owners: BTreeMap<&RoundId, &AbciApp> = BTreeMap::new();
    for app in apps {
        for round_id in app.rounds().keys() {
            if let Some(other) = owners.insert(round_id, app) {
                return Err(ChainError::DuplicateRound {
                    round_id: round_id.clone(),
                    first_app: other.name().to_string(),
                    second_app: app.name().to_string(),
                });
            }
        }
    }

    let mut cross_period_persisted_keys = BTreeSet::new();
    for app in apps {
        cross_period_persisted_keys.extend(app.cross_period_persisted_keys().iter().cloned());
    }

    for (from, to) in transition_mapping {
        let from_app = owners
            .get(from)
            .ok_or_else(|| ChainError::UnknownRound(from.clone()))?;
        if !from_app.is_final(from) {
            return Err(ChainError::NotAFinalState(from.clone()));
        }

        let to_app = owners
            .get(to)
            .ok_or_else(|| ChainError::UnknownRound(to.clone()))?;
        if !to_app.initial_states().contains(to) {
            return Err(ChainError::NotAnInitialState(to.clone()));
        }

        // Keys the target needs must be guaranteed by the final state it is entered from, or survive
        // from an earlier period.
        let guaranteed = from_app.db_post_conditions().get(from);
        let missing: Vec<String> = to_app
            .db_pre_conditions()
            .get(to)
            .into_iter()
            .flatten()
            .filter(|key| {
                !guaranteed.is_some_and(|keys| keys.contains(*key))
                    && !cross_period_persisted_keys.contains(*key)
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ChainError::DataContract {
                from: from.clone(),
                to: to.clone(),
                missing,
            });
        }
    }

    let mut event_to_timeout = BTreeMap::new();
    for app in apps {
        for (event, duration) in app.event_to_timeout() {
            match event_to_timeout.insert(event.clone(), *duration) {
                Some(other) if other != *duration => {
                    return Err(ChainError::ConflictingTimeout {
                        event: event.clone(),
                        first: other.as_millis(),
                        second: duration.as_millis(),
                    })
                }
                _ => {}
            }
        }
    }

    let mapped_targets: BTreeSet<&RoundId> = transition_mapping.values().collect();
    let mut initial_states = first.initial_states().clone();
    for app in &apps[1..] {
        for round_id in app.initial_states() {
            if !mapped_targets.contains(round_id) {
                initial_states.insert(round_id.clone());
            }
        }
    }

    let mut rounds = BTreeMap::new();
    let mut transition_function = BTreeMap::new();
    let mut final_states = BTreeSet::new();
    let mut db_pre_conditions = BTreeMap::new();
    let mut db_post_conditions = BTreeMap::new();
    for app in apps {
        rounds.extend(app.rounds().iter().map(|(k, v)| (k.clone(), v.clone())));
        transition_function.extend(
            app.transition_function()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        final_states.extend(
            app.final_states()
                .iter()
                .filter(|round_id| !transition_mapping.contains_key(*round_id))
                .cloned(),
        );
        db_pre_conditions.extend(
            app.db_pre_conditions()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        db_post_conditions.extend(
            app.db_post_conditions()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
    for (from, to) in transition_mapping {
        transition_function.insert(from.clone(), BTreeMap::from([(CHAIN_DONE, to.clone())]));
    }

    let name = apps
        .iter()
        .map(AbciApp::name)
        .collect::<Vec<&str>>()
        .join("+");

    let spec = AbciAppSpec::builder()
        .name(name)
        .initial_round(first.initial_round().clone())
        .initial_states(initial_states)
        .rounds(rounds)
        .transition_function(transition_function)
        .final_states(final_states)
        .event_to_timeout(event_to_timeout)
        .db_pre_conditions(db_pre_conditions)
        .db_post_conditions(db_post_conditions)
        .cross_period_persisted_keys(cross_period_persisted_keys)
        .build();

    Ok(AbciApp::new(spec)?)
}

/// Reasons a set of apps cannot be chained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("there are no apps to chain")]
    NoApps,

    #[error("round {round_id} is declared by both {first_app} and {second_app}")]
    DuplicateRound {
        round_id: RoundId,
        first_app: String,
        second_app: String,
    },

    #[error("round {0} is not declared by any of the chained apps")]
    UnknownRound(RoundId),

    #[error("round {0} is mapped, but it is not a final state")]
    NotAFinalState(RoundId),

    #[error("round {0} is mapped to, but it is not an initial state")]
    NotAnInitialState(RoundId),

    #[error("{to} needs keys {missing:?}, which {from} does not guarantee")]
    DataContract {
        from: RoundId,
        to: RoundId,
        missing: Vec<String>,
    },

    #[error("timeout event {event} has conflicting durations of {first}ms and {second}ms")]
    ConflictingTimeout {
        event: Event,
        first: u128,
        second: u128,
    },

    #[error(transparent)]
    Invalid(#[from] AbciAppError),
}

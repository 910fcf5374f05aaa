/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Transition graphs of rounds, their validation, their execution, and their composition.
//!
//! An [`AbciApp`] is a validated transition graph. It is built from an [`AbciAppSpec`], which is
//! in turn constructed with the builder pattern:
//!
//! ```ignore
//! let app = AbciApp::new(
//!     AbciAppSpec::builder()
//!         .name("HealthAbciApp")
//!         .initial_round(CHECK_ROUND)
//!         .rounds(rounds)
//!         .transition_function(transition_function)
//!         .final_states(final_states)
//!         .event_to_timeout(event_to_timeout)
//!         .build(),
//! )?;
//! ```
//!
//! ## Validation
//!
//! [`AbciApp::new`] validates an [`AbciAppSpec`] once, so that a graph that could drive replicas into
//! inconsistent states is never run. It checks that:
//! 1. The initial round is one of the initial states.
//! 2. Every round that the graph mentions is registered with a [`RoundKind`].
//! 3. A round is a final state if and only if it is degenerate and has no outgoing edges.
//! 4. Every other round has an outgoing edge, and a degenerate round with edges has exactly one.
//! 5. Every event an agreement round can emit has an edge (totality).
//! 6. Every timeout event labels some edge.
//! 7. Pre-conditions are only declared on entry points: initial states, or rounds entered by
//!    passing through a degenerate round. Post-conditions are declared on exactly the degenerate
//!    rounds.
//! 8. Every round is reachable from the initial states.
//!
//! Running an app is the job of the [`AbciAppEngine`](engine::AbciAppEngine). Composing apps is
//! the job of [`chain`](chain::chain).

pub mod chain;

pub mod engine;

pub use chain::{chain, ChainError, CHAIN_DONE};
pub use engine::{AbciAppEngine, EngineError, Transition};

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{
    rounds::RoundKind,
    types::basic::{Event, RoundId},
};

/// Outgoing edges of every round: `transition_function[round][event]` is the round entered when
/// `round` ends with `event`.
pub type TransitionFunction = BTreeMap<RoundId, BTreeMap<Event, RoundId>>;

/// Synchronized data keys that must be set at a round.
pub type DataConditions = BTreeMap<RoundId, BTreeSet<String>>;

/// Unvalidated description of an [`AbciApp`].
#[derive(TypedBuilder, Clone, Debug)]
#[builder(builder_method(doc = "
    Create a builder for building an [AbciAppSpec]. On the builder call the following methods to construct a valid [AbciAppSpec].

    Required:
    - `.name(...)`
    - `.initial_round(...)`
    - `.rounds(...)`
    - `.transition_function(...)`
    - `.final_states(...)`

    Optional:
    - `.initial_states(...)`
    - `.event_to_timeout(...)`
    - `.db_pre_conditions(...)`
    - `.db_post_conditions(...)`
    - `.cross_period_persisted_keys(...)`
"))]
pub struct AbciAppSpec {
    #[builder(setter(into, doc = "Set the name of the app, used in logs and errors. Required."))]
    pub name: String,
    #[builder(setter(doc = "Set the round that the engine enters first. Required."))]
    pub initial_round: RoundId,
    #[builder(default, setter(doc = "Set the rounds that the app may be entered at. Defaults to only the initial round."))]
    pub initial_states: BTreeSet<RoundId>,
    #[builder(setter(doc = "Register every round of the app with its kind. Required."))]
    pub rounds: BTreeMap<RoundId, RoundKind>,
    #[builder(setter(doc = "Set the outgoing edges of every round. Required."))]
    pub transition_function: TransitionFunction,
    #[builder(setter(doc = "Set the terminal rounds of the app. Required."))]
    pub final_states: BTreeSet<RoundId>,
    #[builder(default, setter(doc = "Set the events that the engine synthesises when a round lasts too long, and after how long. Optional."))]
    pub event_to_timeout: BTreeMap<Event, Duration>,
    #[builder(default, setter(doc = "Set the keys that must be set when an entry round is entered. Optional."))]
    pub db_pre_conditions: DataConditions,
    #[builder(default, setter(doc = "Set the keys that must be set when a degenerate round is entered. Optional, but must cover every degenerate round if given."))]
    pub db_post_conditions: DataConditions,
    #[builder(default, setter(doc = "Set the keys that are kept when a new period starts. Optional."))]
    pub cross_period_persisted_keys: BTreeSet<String>,
}

/// A validated transition graph of rounds.
#[derive(Clone, Debug)]
pub struct AbciApp {
    spec: AbciAppSpec,
}

impl AbciApp {
    /// Validate `spec`, returning an `AbciApp` if it is sound.
    pub fn new(mut spec: AbciAppSpec) -> Result<AbciApp, AbciAppError> {
        if spec.initial_states.is_empty() {
            spec.initial_states.insert(spec.initial_round.clone());
        }

        // A degenerate round only needs post-conditions spelled out if any round has them.
        if spec.db_post_conditions.is_empty() {
            for (round_id, kind) in spec.rounds.iter() {
                if kind.is_degenerate() {
                    spec.db_post_conditions
                        .insert(round_id.clone(), BTreeSet::new());
                }
            }
        }

        validate(&spec)?;
        Ok(AbciApp { spec })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn initial_round(&self) -> &RoundId {
        &self.spec.initial_round
    }

    pub fn initial_states(&self) -> &BTreeSet<RoundId> {
        &self.spec.initial_states
    }

    pub fn final_states(&self) -> &BTreeSet<RoundId> {
        &self.spec.final_states
    }

    pub fn rounds(&self) -> &BTreeMap<RoundId, RoundKind> {
        &self.spec.rounds
    }

    pub fn round_kind(&self, round_id: &RoundId) -> Option<&RoundKind> {
        self.spec.rounds.get(round_id)
    }

    pub fn transition_function(&self) -> &TransitionFunction {
        &self.spec.transition_function
    }

    pub fn event_to_timeout(&self) -> &BTreeMap<Event, Duration> {
        &self.spec.event_to_timeout
    }

    pub fn db_pre_conditions(&self) -> &DataConditions {
        &self.spec.db_pre_conditions
    }

    pub fn db_post_conditions(&self) -> &DataConditions {
        &self.spec.db_post_conditions
    }

    pub fn cross_period_persisted_keys(&self) -> &BTreeSet<String> {
        &self.spec.cross_period_persisted_keys
    }

    /// Get the round entered when `round_id` ends with `event`.
    pub fn next_round(&self, round_id: &RoundId, event: &Event) -> Option<&RoundId> {
        self.spec
            .transition_function
            .get(round_id)
            .and_then(|edges| edges.get(event))
    }

    /// Get the outgoing edges of `round_id`, in event order.
    pub fn edges(&self, round_id: &RoundId) -> impl Iterator<Item = (&Event, &RoundId)> {
        self.spec
            .transition_function
            .get(round_id)
            .into_iter()
            .flat_map(|edges| edges.iter())
    }

    pub fn is_final(&self, round_id: &RoundId) -> bool {
        self.spec.final_states.contains(round_id)
    }

    /// Get the timeout that fires first while the engine sits in `round_id`, if any. Ties are broken
    /// in favour of the smallest event name.
    pub fn round_timeout(&self, round_id: &RoundId) -> Option<(&Event, Duration)> {
        self.edges(round_id)
            .filter_map(|(event, _)| {
                self.spec
                    .event_to_timeout
                    .get(event)
                    .map(|duration| (event, *duration))
            })
            .min_by(|(e1, d1), (e2, d2)| d1.cmp(d2).then_with(|| e1.cmp(e2)))
    }

    /// Get the [`AbciAppSpec`] this app was validated from, with defaults filled in.
    pub fn spec(&self) -> &AbciAppSpec {
        &self.spec
    }
}

fn validate(spec: &AbciAppSpec) -> Result<(), AbciAppError> {
    let app = &spec.name;
    let registered = |round_id: &RoundId| -> Result<(), AbciAppError> {
        if spec.rounds.contains_key(round_id) {
            Ok(())
        } else {
            Err(AbciAppError::UnregisteredRound {
                app: app.clone(),
                round_id: round_id.clone(),
            })
        }
    };

    // 1.
    if !spec.initial_states.contains(&spec.initial_round) {
        return Err(AbciAppError::InitialRoundNotInitialState {
            app: app.clone(),
            round_id: spec.initial_round.clone(),
        });
    }

    // 2.
    for round_id in spec.initial_states.iter().chain(spec.final_states.iter()) {
        registered(round_id)?;
    }
    for (round_id, edges) in spec.transition_function.iter() {
        registered(round_id)?;
        for (event, target) in edges.iter() {
            if !spec.rounds.contains_key(target) {
                return Err(AbciAppError::UndeclaredTarget {
                    app: app.clone(),
                    round_id: round_id.clone(),
                    event: event.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    let num_edges = |round_id: &RoundId| {
        spec.transition_function
            .get(round_id)
            .map_or(0, |edges| edges.len())
    };

    // 3. and 4.
    for (round_id, kind) in spec.rounds.iter() {
        let is_final = spec.final_states.contains(round_id);
        match (kind.is_degenerate(), num_edges(round_id), is_final) {
            (true, 0, true) => {}
            (true, 0, false) => {
                return Err(AbciAppError::DegenerateRoundNotFinal {
                    app: app.clone(),
                    round_id: round_id.clone(),
                })
            }
            (true, 1, false) => {}
            (true, _, false) => {
                return Err(AbciAppError::AmbiguousPassthrough {
                    app: app.clone(),
                    round_id: round_id.clone(),
                })
            }
            (false, 0, false) => {
                return Err(AbciAppError::DeadEnd {
                    app: app.clone(),
                    round_id: round_id.clone(),
                })
            }
            (false, _, false) => {}
            (_, _, true) => {
                return Err(AbciAppError::FinalStateNotTerminal {
                    app: app.clone(),
                    round_id: round_id.clone(),
                })
            }
        }
    }

    // 5.
    for (round_id, kind) in spec.rounds.iter() {
        for event in kind.events() {
            let has_edge = spec
                .transition_function
                .get(round_id)
                .is_some_and(|edges| edges.contains_key(&event));
            if !has_edge {
                return Err(AbciAppError::MissingTransition {
                    app: app.clone(),
                    round_id: round_id.clone(),
                    event,
                });
            }
        }
    }

    // 6.
    for event in spec.event_to_timeout.keys() {
        let used = spec
            .transition_function
            .values()
            .any(|edges| edges.contains_key(event));
        if !used {
            return Err(AbciAppError::UnusedTimeoutEvent {
                app: app.clone(),
                event: event.clone(),
            });
        }
    }

    // 7.
    let passthrough_targets: BTreeSet<&RoundId> = spec
        .rounds
        .iter()
        .filter(|(_, kind)| kind.is_degenerate())
        .flat_map(|(round_id, _)| {
            spec.transition_function
                .get(round_id)
                .into_iter()
                .flat_map(|edges| edges.values())
        })
        .collect();
    for round_id in spec.db_pre_conditions.keys() {
        if !spec.initial_states.contains(round_id) && !passthrough_targets.contains(round_id) {
            return Err(AbciAppError::PreConditionNotOnEntry {
                app: app.clone(),
                round_id: round_id.clone(),
            });
        }
    }
    let degenerate: BTreeSet<&RoundId> = spec
        .rounds
        .iter()
        .filter(|(_, kind)| kind.is_degenerate())
        .map(|(round_id, _)| round_id)
        .collect();
    let with_post_conditions: BTreeSet<&RoundId> = spec.db_post_conditions.keys().collect();
    if degenerate != with_post_conditions {
        return Err(AbciAppError::PostConditionsMismatch {
            app: app.clone(),
            expected: degenerate.into_iter().cloned().collect(),
            actual: with_post_conditions.into_iter().cloned().collect(),
        });
    }

    // 8.
    let mut reached: BTreeSet<&RoundId> = spec.initial_states.iter().collect();
    let mut frontier: VecDeque<&RoundId> = spec.initial_states.iter().collect();
    while let Some(round_id) = frontier.pop_front() {
        if let Some(edges) = spec.transition_function.get(round_id) {
            for target in edges.values() {
                if reached.insert(target) {
                    frontier.push_back(target);
                }
            }
        }
    }
    if let Some(round_id) = spec.rounds.keys().find(|round_id| !reached.contains(round_id)) {
        return Err(AbciAppError::UnreachableRound {
            app: app.clone(),
            round_id: round_id.clone(),
        });
    }

    Ok(())
}

/// Reasons an [`AbciAppSpec`] does not describe a sound transition graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbciAppError {
    #[error("{app}: initial round {round_id} is not an initial state")]
    InitialRoundNotInitialState { app: String, round_id: RoundId },

    #[error("{app}: round {round_id} is not registered")]
    UnregisteredRound { app: String, round_id: RoundId },

    #[error("{app}: edge {round_id} --{event}--> {target} leads to an undeclared round")]
    UndeclaredTarget {
        app: String,
        round_id: RoundId,
        event: Event,
        target: RoundId,
    },

    #[error("{app}: degenerate round {round_id} has no edges but is not a final state")]
    DegenerateRoundNotFinal { app: String, round_id: RoundId },

    #[error("{app}: degenerate round {round_id} has more than one outgoing edge")]
    AmbiguousPassthrough { app: String, round_id: RoundId },

    #[error("{app}: round {round_id} is not final but has no outgoing edges")]
    DeadEnd { app: String, round_id: RoundId },

    #[error("{app}: final state {round_id} must be a degenerate round with no outgoing edges")]
    FinalStateNotTerminal { app: String, round_id: RoundId },

    #[error("{app}: round {round_id} can emit {event}, which has no transition")]
    MissingTransition {
        app: String,
        round_id: RoundId,
        event: Event,
    },

    #[error("{app}: timeout event {event} labels no edge")]
    UnusedTimeoutEvent { app: String, event: Event },

    #[error("{app}: pre-conditions declared on {round_id}, which is not an entry round")]
    PreConditionNotOnEntry { app: String, round_id: RoundId },

    #[error("{app}: post-conditions must be declared on exactly {expected:?}, but are declared on {actual:?}")]
    PostConditionsMismatch {
        app: String,
        expected: Vec<RoundId>,
        actual: Vec<RoundId>,
    },

    #[error("{app}: round {round_id} is unreachable from the initial states")]
    UnreachableRound { app: String, round_id: RoundId },
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Behaviour`] trait, which the library user implements to decide what the local replica
//! votes for in each round.
//!
//! Rounds and the [engine](crate::abci_app::AbciAppEngine) are pure and synchronous. Everything that
//! touches the outside world, e.g., fetching exchange balances or building a transaction, happens in
//! a behaviour, and reaches the engine only as the content of a signed
//! [payload](crate::types::payload::Payload).
//!
//! Behaviours are registered per round id in a [`BehaviourRegistry`]. While the engine sits in an
//! agreement round, the [replica](crate::replica) asks the matching behaviour for a payload once per
//! round instance. A replica with no behaviour for the current round does not vote in it.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    abci_app::{AbciApp, Transition},
    synchronized_data::SynchronizedData,
    types::basic::{RoundCount, RoundId},
};

pub trait Behaviour: Send {
    /// The round this behaviour computes payloads for.
    fn matching_round(&self) -> RoundId;

    /// Compute the content of the local replica's payload for the current instance of the matching
    /// round.
    ///
    /// Returning [`BehaviourError::NotReady`] asks the replica to call this method again on its next
    /// tick.
    fn compute_payload(&mut self, request: PayloadRequest) -> Result<Value, BehaviourError>;

    /// Called after the engine leaves an instance of the matching round.
    fn on_round_end(&mut self, _transition: &Transition, _data: &SynchronizedData) {}
}

/// What a [`Behaviour`] is asked to compute a payload for.
pub struct PayloadRequest<'a> {
    pub round_id: &'a RoundId,
    pub round_count: RoundCount,
    /// The synchronized data the round instance was entered with.
    pub data: &'a SynchronizedData,
}

/// The behaviours of a replica, keyed by the round each of them matches.
#[derive(Default)]
pub struct BehaviourRegistry {
    behaviours: BTreeMap<RoundId, Box<dyn Behaviour>>,
}

impl BehaviourRegistry {
    pub fn new() -> BehaviourRegistry {
        Self::default()
    }

    /// Register `behaviour` for the round it matches. At most one behaviour can match each round.
    pub fn register(&mut self, behaviour: impl Behaviour + 'static) -> Result<(), BehaviourError> {
        let round_id = behaviour.matching_round();
        if self.behaviours.contains_key(&round_id) {
            return Err(BehaviourError::DuplicateBehaviour(round_id));
        }
        self.behaviours.insert(round_id, Box::new(behaviour));
        Ok(())
    }

    /// Builder-style version of [`register`](Self::register).
    pub fn with(mut self, behaviour: impl Behaviour + 'static) -> Result<Self, BehaviourError> {
        self.register(behaviour)?;
        Ok(self)
    }

    pub fn contains(&self, round_id: &RoundId) -> bool {
        self.behaviours.contains_key(round_id)
    }

    pub fn round_ids(&self) -> impl Iterator<Item = &RoundId> {
        self.behaviours.keys()
    }

    pub fn len(&self) -> usize {
        self.behaviours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviours.is_empty()
    }

    /// Check that every behaviour matches an agreement round of `app`. Behaviours that match no such
    /// round would never be called.
    pub fn check_against(&self, app: &AbciApp) -> Result<(), BehaviourError> {
        for round_id in self.behaviours.keys() {
            match app.round_kind(round_id) {
                Some(kind) if !kind.is_degenerate() => {}
                _ => return Err(BehaviourError::UnmatchedRound(round_id.clone())),
            }
        }
        Ok(())
    }

    /// Ask the behaviour matching `request.round_id` for a payload. Returns `None` if no behaviour
    /// matches the round.
    pub(crate) fn compute_payload(
        &mut self,
        request: PayloadRequest,
    ) -> Option<Result<Value, BehaviourError>> {
        self.behaviours
            .get_mut(request.round_id)
            .map(|behaviour| behaviour.compute_payload(request))
    }

    pub(crate) fn notify_round_end(&mut self, transition: &Transition, data: &SynchronizedData) {
        if let Some(behaviour) = self.behaviours.get_mut(&transition.from) {
            behaviour.on_round_end(transition, data);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BehaviourError {
    #[error("the payload is not ready yet")]
    NotReady,

    #[error("behaviour for round {round_id} failed: {reason}")]
    Failed { round_id: RoundId, reason: String },

    #[error("a behaviour is already registered for round {0}")]
    DuplicateBehaviour(RoundId),

    #[error("round {0} is not an agreement round of the app")]
    UnmatchedRound(RoundId),
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic behaviours: every replica that runs them votes for the same content.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use round_abci::{
    abci_app::Transition,
    behaviour::{Behaviour, BehaviourError, PayloadRequest},
    synchronized_data::SynchronizedData,
    types::basic::RoundId,
};
use serde_json::Value;

type ComputeFn = Box<dyn FnMut(&PayloadRequest) -> Result<Value, BehaviourError> + Send>;

/// A behaviour that computes its payload with a closure, and counts the instances of its round that
/// ended.
pub(crate) struct FnBehaviour {
    round_id: RoundId,
    compute: ComputeFn,
    round_ends: Arc<AtomicUsize>,
}

impl FnBehaviour {
    pub(crate) fn new(
        round_id: RoundId,
        compute: impl FnMut(&PayloadRequest) -> Result<Value, BehaviourError> + Send + 'static,
    ) -> FnBehaviour {
        FnBehaviour {
            round_id,
            compute: Box::new(compute),
            round_ends: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always vote for `content`.
    pub(crate) fn fixed(round_id: RoundId, content: Value) -> FnBehaviour {
        Self::new(round_id, move |_| Ok(content.clone()))
    }

    /// Never produce a payload.
    pub(crate) fn never_ready(round_id: RoundId) -> FnBehaviour {
        Self::new(round_id, |_| Err(BehaviourError::NotReady))
    }

    pub(crate) fn round_ends(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.round_ends)
    }
}

impl Behaviour for FnBehaviour {
    fn matching_round(&self) -> RoundId {
        self.round_id.clone()
    }

    fn compute_payload(&mut self, request: PayloadRequest) -> Result<Value, BehaviourError> {
        (self.compute)(&request)
    }

    fn on_round_end(&mut self, _transition: &Transition, _data: &SynchronizedData) {
        self.round_ends.fetch_add(1, Ordering::SeqCst);
    }
}

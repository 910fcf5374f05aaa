/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The engine that runs one [`AbciApp`] on one replica.
//!
//! The engine holds the current round instance and drives it through the app's transition graph.
//! It is synchronous and does no I/O: the [replica](crate::replica) feeds it payloads and consensus
//! timestamps, and reads back transitions.
//!
//! ## Round lifecycle
//!
//! 1. [`submit_payload`](AbciAppEngine::submit_payload) hands a payload to the current round.
//! 2. [`end_block`](AbciAppEngine::end_block) concludes the current round if its threshold has been
//!    reached, and [processes](AbciAppEngine::process_event) the resulting event.
//! 3. [`update_time`](AbciAppEngine::update_time) advances consensus time. If the current round has
//!    outlived one of its timeouts, the engine synthesises the timeout event exactly once, and
//!    processes it like any other event.
//!
//! ## Degenerate rounds
//!
//! Entering a degenerate round that has no outgoing edge finishes the engine. Entering one that does
//! (which only happens in [chained](super::chain) apps) passes straight through it along its edge.
//! Either way, the post-conditions of the degenerate round are checked on entry.
//!
//! ## Fatal errors
//!
//! Every [`EngineError`] halts the engine: the transition graph and the data model have drifted
//! apart, and continuing could fork the replicas. A halted engine rejects every further operation.

use std::{
    sync::{mpsc::Sender, Arc},
    time::SystemTime,
};

use crate::{
    events::*,
    rounds::{PayloadError, RevotePolicy, Round, RoundError, RoundStatus},
    synchronized_data::SynchronizedData,
    types::{
        basic::{Event, RoundCount, RoundId, Timestamp},
        participants::ParticipantSet,
        payload::Payload,
    },
};

use super::AbciApp;

/// A transition made by the engine. `event` is the event that `from` ended with. When the engine
/// passed through degenerate rounds, `to` is where it came to rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: RoundId,
    pub event: Event,
    pub to: RoundId,
    pub round_count: RoundCount,
}

pub struct AbciAppEngine {
    app: Arc<AbciApp>,
    participants: ParticipantSet,
    revote_policy: RevotePolicy,
    current_round: Box<dyn Round>,
    round_count: RoundCount,
    // Consensus time at which the current round was entered. `None` until the first timestamp.
    round_entered_at: Option<Timestamp>,
    latest_timestamp: Option<Timestamp>,
    threshold_announced: bool,
    halted: bool,
    event_publisher: Option<Sender<EngineEvent>>,
}

impl AbciAppEngine {
    /// Create an engine that enters `app` at its initial round with `data`.
    pub fn new(
        app: Arc<AbciApp>,
        participants: ParticipantSet,
        data: SynchronizedData,
        revote_policy: RevotePolicy,
    ) -> Result<AbciAppEngine, EngineError> {
        let initial_round = app.initial_round().clone();
        Self::new_at(app, participants, data, revote_policy, initial_round)
    }

    /// Create an engine that enters `app` at `initial_state`, which must be one of its initial states.
    pub fn new_at(
        app: Arc<AbciApp>,
        participants: ParticipantSet,
        data: SynchronizedData,
        revote_policy: RevotePolicy,
        initial_state: RoundId,
    ) -> Result<AbciAppEngine, EngineError> {
        if !app.initial_states().contains(&initial_state) {
            return Err(EngineError::NotAnInitialState(initial_state));
        }
        let kind = app
            .round_kind(&initial_state)
            .ok_or_else(|| EngineError::UnknownRound(initial_state.clone()))?;

        let data = data.with_cross_period_persisted_keys(app.cross_period_persisted_keys().iter().cloned());
        let round_count = RoundCount::init();
        let current_round = kind.instantiate(
            initial_state,
            round_count,
            data,
            participants.clone(),
            revote_policy,
        );

        let engine = AbciAppEngine {
            app,
            participants,
            revote_policy,
            current_round,
            round_count,
            round_entered_at: None,
            latest_timestamp: None,
            threshold_announced: false,
            halted: false,
            event_publisher: None,
        };
        engine.check_pre_conditions()?;
        Ok(engine)
    }

    /// Publish the engine's events to `event_publisher` from now on.
    pub fn with_event_publisher(mut self, event_publisher: Option<Sender<EngineEvent>>) -> Self {
        self.event_publisher = event_publisher;
        EngineEvent::EnterRound(EnterRoundEvent {
            timestamp: SystemTime::now(),
            round_id: self.current_round.round_id().clone(),
            round_count: self.round_count,
        })
        .publish(&self.event_publisher);
        self
    }

    pub fn app(&self) -> &AbciApp {
        &self.app
    }

    pub fn current_round_id(&self) -> &RoundId {
        self.current_round.round_id()
    }

    pub fn current_round_status(&self) -> RoundStatus {
        self.current_round.status()
    }

    pub fn round_count(&self) -> RoundCount {
        self.round_count
    }

    /// Get the synchronized data the current round was entered with.
    pub fn synchronized_data_snapshot(&self) -> SynchronizedData {
        self.current_round.synchronized_data().clone()
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    /// Check whether the engine has entered a final state.
    pub fn is_finished(&self) -> bool {
        self.app.is_final(self.current_round.round_id())
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Hand `payload` to the current round. A rejected payload is dropped, and does not count towards
    /// the threshold.
    pub fn submit_payload(&mut self, payload: Payload) -> Result<(), PayloadError> {
        if self.halted {
            return Err(PayloadError::NotAccepting(self.current_round_id().clone()));
        }

        let origin = payload.sender;
        match self.current_round.submit(payload) {
            Ok(()) => {
                EngineEvent::ReceivePayload(ReceivePayloadEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    round_id: self.current_round_id().clone(),
                    round_count: self.round_count,
                })
                .publish(&self.event_publisher);

                if !self.threshold_announced && self.current_round.threshold_reached() {
                    self.threshold_announced = true;
                    EngineEvent::ThresholdReached(ThresholdReachedEvent {
                        timestamp: SystemTime::now(),
                        round_id: self.current_round_id().clone(),
                        round_count: self.round_count,
                    })
                    .publish(&self.event_publisher);
                }
                Ok(())
            }
            Err(err) => {
                EngineEvent::RejectPayload(RejectPayloadEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    round_id: self.current_round_id().clone(),
                    reason: err.clone(),
                })
                .publish(&self.event_publisher);
                Err(err)
            }
        }
    }

    /// Conclude the current round if its threshold has been reached, and transition with the event it
    /// decided on. Returns `Ok(None)` if the round has not reached its threshold.
    pub fn end_block(&mut self) -> Result<Option<Transition>, EngineError> {
        self.check_not_halted()?;

        let result = match self.current_round.end_block() {
            Ok(Some((data, event))) => self.process_event(data, event).map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(EngineError::Round(err)),
        };
        self.halt_on_err(result)
    }

    /// Advance consensus time to `timestamp`. If the current round has outlived its timeout,
    /// transition with the timeout event, keeping the synchronized data unchanged.
    ///
    /// A round instance counts as entered at the latest timestamp seen when the engine transitioned
    /// into it, or at the first timestamp after that if none had been seen. Timestamps that go
    /// backwards are ignored.
    pub fn update_time(&mut self, timestamp: Timestamp) -> Result<Option<Transition>, EngineError> {
        self.check_not_halted()?;

        if self.latest_timestamp.is_some_and(|latest| timestamp < latest) {
            return Ok(None);
        }
        self.latest_timestamp = Some(timestamp);
        let entered_at = *self.round_entered_at.get_or_insert(timestamp);

        let (event, duration) = match self.app.round_timeout(self.current_round_id()) {
            Some((event, duration)) => (event.clone(), duration),
            None => return Ok(None),
        };
        if timestamp < entered_at.saturating_add(duration) {
            return Ok(None);
        }

        EngineEvent::RoundTimeout(RoundTimeoutEvent {
            timestamp: SystemTime::now(),
            round_id: self.current_round_id().clone(),
            round_count: self.round_count,
            event: event.clone(),
        })
        .publish(&self.event_publisher);

        let data = self.current_round.synchronized_data().clone();
        let result = self.process_event(data, event).map(Some);
        self.halt_on_err(result)
    }

    /// Leave the current round with `event`, entering the round that the transition function maps
    /// it to with `data`.
    pub fn process_event(
        &mut self,
        data: SynchronizedData,
        event: Event,
    ) -> Result<Transition, EngineError> {
        self.check_not_halted()?;
        let result = self.transition(data, event);
        self.halt_on_err(result)
    }

    fn transition(&mut self, data: SynchronizedData, event: Event) -> Result<Transition, EngineError> {
        let from = self.current_round_id().clone();
        let trigger = event.clone();
        let mut data = data;
        let mut event = event;

        loop {
            let source = self.current_round_id().clone();
            let target = self
                .app
                .next_round(&source, &event)
                .cloned()
                .ok_or_else(|| EngineError::MissingTransition {
                    round_id: source.clone(),
                    event: event.clone(),
                })?;
            let kind = self
                .app
                .round_kind(&target)
                .cloned()
                .ok_or_else(|| EngineError::UnknownRound(target.clone()))?;

            let previous_period = self.current_round.synchronized_data().period();
            let new_period = data.period();

            self.round_count = self.round_count + 1;
            self.round_entered_at = self.latest_timestamp;
            self.threshold_announced = false;
            self.current_round = kind.instantiate(
                target.clone(),
                self.round_count,
                data,
                self.participants.clone(),
                self.revote_policy,
            );

            EngineEvent::Transition(TransitionEvent {
                timestamp: SystemTime::now(),
                from: source,
                event: event.clone(),
                to: target.clone(),
            })
            .publish(&self.event_publisher);
            if new_period != previous_period {
                EngineEvent::NewPeriod(NewPeriodEvent {
                    timestamp: SystemTime::now(),
                    period: new_period,
                })
                .publish(&self.event_publisher);
            }
            EngineEvent::EnterRound(EnterRoundEvent {
                timestamp: SystemTime::now(),
                round_id: target.clone(),
                round_count: self.round_count,
            })
            .publish(&self.event_publisher);

            self.check_pre_conditions()?;

            if !kind.is_degenerate() {
                return Ok(Transition {
                    from,
                    event: trigger,
                    to: target,
                    round_count: self.round_count,
                });
            }

            self.check_post_conditions()?;

            // A degenerate round has at most one edge; follow it if there is one.
            let passthrough = self
                .app
                .edges(&target)
                .next()
                .map(|(chain_event, _)| chain_event.clone());
            match passthrough {
                Some(chain_event) => {
                    data = self.current_round.synchronized_data().clone();
                    event = chain_event;
                }
                None => {
                    EngineEvent::EnterFinalRound(EnterFinalRoundEvent {
                        timestamp: SystemTime::now(),
                        round_id: target.clone(),
                        data_hash: self.current_round.synchronized_data().hash(),
                    })
                    .publish(&self.event_publisher);
                    return Ok(Transition {
                        from,
                        event: trigger,
                        to: target,
                        round_count: self.round_count,
                    });
                }
            }
        }
    }

    fn check_pre_conditions(&self) -> Result<(), EngineError> {
        let round_id = self.current_round_id();
        if let Some(keys) = self.app.db_pre_conditions().get(round_id) {
            let missing = self
                .current_round
                .synchronized_data()
                .missing_keys(keys.iter().map(String::as_str));
            if !missing.is_empty() {
                return Err(EngineError::PreConditionFailed {
                    round_id: round_id.clone(),
                    missing,
                });
            }
        }
        Ok(())
    }

    fn check_post_conditions(&self) -> Result<(), EngineError> {
        let round_id = self.current_round_id();
        if let Some(keys) = self.app.db_post_conditions().get(round_id) {
            let missing = self
                .current_round
                .synchronized_data()
                .missing_keys(keys.iter().map(String::as_str));
            if !missing.is_empty() {
                return Err(EngineError::PostConditionFailed {
                    round_id: round_id.clone(),
                    missing,
                });
            }
        }
        Ok(())
    }

    fn check_not_halted(&self) -> Result<(), EngineError> {
        if self.halted {
            Err(EngineError::Halted)
        } else {
            Ok(())
        }
    }

    fn halt_on_err<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if result.is_err() {
            self.halted = true;
        }
        result
    }
}

/// Fatal errors that halt an [`AbciAppEngine`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("round {round_id} ended with {event}, which has no transition")]
    MissingTransition { round_id: RoundId, event: Event },

    #[error("round {0} is not registered in the app")]
    UnknownRound(RoundId),

    #[error("round {0} is not an initial state of the app")]
    NotAnInitialState(RoundId),

    #[error("entered round {round_id} without keys {missing:?}")]
    PreConditionFailed {
        round_id: RoundId,
        missing: Vec<String>,
    },

    #[error("left through round {round_id} without keys {missing:?}")]
    PostConditionFailed {
        round_id: RoundId,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Round(#[from] RoundError),

    #[error("the engine has halted after a fatal error")]
    Halted,
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events that the engine and the replica emit, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Every event carries
//! the local time it was emitted at. Local time is only ever used for observability: the engine's
//! decisions depend on consensus [timestamps](crate::types::basic::Timestamp) alone.
//!
//! Events are published over an [mpsc channel](std::sync::mpsc) to the
//! [event bus](crate::event_bus), which runs the [default loggers](crate::logging) and the handlers
//! registered on the [`ReplicaSpec`](crate::replica::ReplicaSpec).

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::{
    rounds::PayloadError,
    types::{
        basic::{CryptoHash, Event, Period, RoundCount, RoundId},
        crypto_primitives::VerifyingKey,
    },
};

pub enum EngineEvent {
    // Events that change the current round.
    EnterRound(EnterRoundEvent),
    Transition(TransitionEvent),
    EnterFinalRound(EnterFinalRoundEvent),
    NewPeriod(NewPeriodEvent),
    // Events that involve receiving a payload.
    ReceivePayload(ReceivePayloadEvent),
    RejectPayload(RejectPayloadEvent),
    ThresholdReached(ThresholdReachedEvent),
    // Timeouts.
    RoundTimeout(RoundTimeoutEvent),
    // Events that involve the commit barrier.
    Commit(CommitEvent),
}

impl EngineEvent {
    /// Send the event to the event bus, if there is one. Events published after the event bus has
    /// shut down are dropped.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<EngineEvent>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// The engine entered a new round instance.
pub struct EnterRoundEvent {
    pub timestamp: SystemTime,
    pub round_id: RoundId,
    pub round_count: RoundCount,
}

/// The engine left `from` with `event` and entered `to`.
pub struct TransitionEvent {
    pub timestamp: SystemTime,
    pub from: RoundId,
    pub event: Event,
    pub to: RoundId,
}

/// The engine entered a final state, and will not progress any further.
pub struct EnterFinalRoundEvent {
    pub timestamp: SystemTime,
    pub round_id: RoundId,
    pub data_hash: CryptoHash,
}

/// A transition opened a new period of the synchronized data.
pub struct NewPeriodEvent {
    pub timestamp: SystemTime,
    pub period: Period,
}

/// The current round accepted a payload.
pub struct ReceivePayloadEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub round_id: RoundId,
    pub round_count: RoundCount,
}

/// The current round dropped a payload.
pub struct RejectPayloadEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub round_id: RoundId,
    pub reason: PayloadError,
}

/// The payloads collected in the current round reached the consensus threshold.
pub struct ThresholdReachedEvent {
    pub timestamp: SystemTime,
    pub round_id: RoundId,
    pub round_count: RoundCount,
}

/// The current round lasted longer than its timeout, and the engine synthesised `event`.
pub struct RoundTimeoutEvent {
    pub timestamp: SystemTime,
    pub round_id: RoundId,
    pub round_count: RoundCount,
    pub event: Event,
}

/// The commit barrier accepted a new version of the synchronized data.
pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub period: Period,
    pub version: u64,
    pub data_hash: CryptoHash,
}

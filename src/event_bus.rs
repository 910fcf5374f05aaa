/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which receives [events](crate::events) published by the replica thread and
//! fires the handlers registered for them.
//!
//! Every event type has a list of handlers: the [default logger](crate::logging) if the replica was
//! configured to log events, followed by the handler the user registered on the
//! [`ReplicaSpec`](crate::replica::ReplicaSpec), if any.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) enter_round_handlers: Vec<HandlerPtr<EnterRoundEvent>>,
    pub(crate) transition_handlers: Vec<HandlerPtr<TransitionEvent>>,
    pub(crate) enter_final_round_handlers: Vec<HandlerPtr<EnterFinalRoundEvent>>,
    pub(crate) new_period_handlers: Vec<HandlerPtr<NewPeriodEvent>>,
    pub(crate) receive_payload_handlers: Vec<HandlerPtr<ReceivePayloadEvent>>,
    pub(crate) reject_payload_handlers: Vec<HandlerPtr<RejectPayloadEvent>>,
    pub(crate) threshold_reached_handlers: Vec<HandlerPtr<ThresholdReachedEvent>>,
    pub(crate) round_timeout_handlers: Vec<HandlerPtr<RoundTimeoutEvent>>,
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        on_enter_round: Option<HandlerPtr<EnterRoundEvent>>,
        on_transition: Option<HandlerPtr<TransitionEvent>>,
        on_enter_final_round: Option<HandlerPtr<EnterFinalRoundEvent>>,
        on_new_period: Option<HandlerPtr<NewPeriodEvent>>,
        on_receive_payload: Option<HandlerPtr<ReceivePayloadEvent>>,
        on_reject_payload: Option<HandlerPtr<RejectPayloadEvent>>,
        on_threshold_reached: Option<HandlerPtr<ThresholdReachedEvent>>,
        on_round_timeout: Option<HandlerPtr<RoundTimeoutEvent>>,
        on_commit: Option<HandlerPtr<CommitEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            enter_round_handlers: handlers(log_events, on_enter_round),
            transition_handlers: handlers(log_events, on_transition),
            enter_final_round_handlers: handlers(log_events, on_enter_final_round),
            new_period_handlers: handlers(log_events, on_new_period),
            receive_payload_handlers: handlers(log_events, on_receive_payload),
            reject_payload_handlers: handlers(log_events, on_reject_payload),
            threshold_reached_handlers: handlers(log_events, on_threshold_reached),
            round_timeout_handlers: handlers(log_events, on_round_timeout),
            commit_handlers: handlers(log_events, on_commit),
        }
    }

    /// Whether no handler is registered for any event. If so, the replica does not start an event bus.
    pub(crate) fn is_empty(&self) -> bool {
        self.enter_round_handlers.is_empty()
            && self.transition_handlers.is_empty()
            && self.enter_final_round_handlers.is_empty()
            && self.new_period_handlers.is_empty()
            && self.receive_payload_handlers.is_empty()
            && self.reject_payload_handlers.is_empty()
            && self.threshold_reached_handlers.is_empty()
            && self.round_timeout_handlers.is_empty()
            && self.commit_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: EngineEvent) {
        match event {
            EngineEvent::EnterRound(enter_round_event) => self
                .enter_round_handlers
                .iter()
                .for_each(|handler| handler(&enter_round_event)),

            EngineEvent::Transition(transition_event) => self
                .transition_handlers
                .iter()
                .for_each(|handler| handler(&transition_event)),

            EngineEvent::EnterFinalRound(enter_final_round_event) => self
                .enter_final_round_handlers
                .iter()
                .for_each(|handler| handler(&enter_final_round_event)),

            EngineEvent::NewPeriod(new_period_event) => self
                .new_period_handlers
                .iter()
                .for_each(|handler| handler(&new_period_event)),

            EngineEvent::ReceivePayload(receive_payload_event) => self
                .receive_payload_handlers
                .iter()
                .for_each(|handler| handler(&receive_payload_event)),

            EngineEvent::RejectPayload(reject_payload_event) => self
                .reject_payload_handlers
                .iter()
                .for_each(|handler| handler(&reject_payload_event)),

            EngineEvent::ThresholdReached(threshold_reached_event) => self
                .threshold_reached_handlers
                .iter()
                .for_each(|handler| handler(&threshold_reached_event)),

            EngineEvent::RoundTimeout(round_timeout_event) => self
                .round_timeout_handlers
                .iter()
                .for_each(|handler| handler(&round_timeout_event)),

            EngineEvent::Commit(commit_event) => self
                .commit_handlers
                .iter()
                .for_each(|handler| handler(&commit_event)),
        }
    }
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(user_handler) = user_handler {
        handlers.push(user_handler);
    }
    handlers
}

/// Spawn the event bus thread. It runs until it receives a shutdown signal, or until every event
/// publisher has been dropped and every published event has been handled.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<EngineEvent>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}

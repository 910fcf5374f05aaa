/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A replicated, round-based state machine engine for multi-agent consensus workflows.
//!
//! An [`AbciApp`](abci_app::AbciApp) is a graph of rounds. In each round every participant submits a
//! signed [payload](types::payload::Payload); once a threshold of participants agree on the same
//! content, the round decides an [event](types::basic::Event), and the app follows the edge of that
//! event to its next round. The agreed-upon state of the app lives in versioned
//! [synchronized data](synchronized_data::SynchronizedData), which every transition extends rather
//! than mutates. Apps are [chained](abci_app::chain) into larger apps, and run on
//! [replicas](replica) connected by a user-provided [network](networking).

pub mod types;

pub mod synchronized_data;

pub mod rounds;

pub mod abci_app;

pub mod apps;

pub mod behaviour;

pub mod networking;

pub mod persistence;

pub mod replica;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

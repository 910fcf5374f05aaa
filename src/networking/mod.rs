/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer (P2P) networking.
//!
//! The library user provides the replica with an implementation of [`Network`](network::Network),
//! which carries two kinds of [messages](messages::Message) between replicas: signed payloads, and
//! the timestamps that the consensus layer agreed on.

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive enumeration of the messages exchanged between replicas.

use crate::types::{
    basic::{RoundCount, Timestamp},
    payload::Payload,
};

/// All message variants exchanged between replicas.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// A replica's vote for one round instance.
    Payload(Payload),

    /// A timestamp agreed on by the consensus layer, e.g., the time of the latest committed block.
    /// Round timeouts are measured against these, never against local clocks. Every replica must
    /// receive them in the same order relative to the payloads of each round instance.
    BlockTimestamp(Timestamp),
}

impl Message {
    /// Get the round count of the inner payload, if this message carries one.
    pub fn round_count(&self) -> Option<RoundCount> {
        match self {
            Message::Payload(payload) => Some(payload.round_count),
            Message::BlockTimestamp(_) => None,
        }
    }
}

impl From<Payload> for Message {
    fn from(value: Payload) -> Self {
        Message::Payload(value)
    }
}

impl From<Timestamp> for Message {
    fn from(value: Timestamp) -> Self {
        Message::BlockTimestamp(value)
    }
}

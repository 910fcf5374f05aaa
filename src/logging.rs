/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::replica::ReplicaConfiguration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceivePayload](crate::events::ReceivePayloadEvent) is printed:
//!
//! ```text
//! ReceivePayload, 1701329264, Id5u7f6, CollectExchangeDataRound, 3
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   payload's sender.
//! - The fourth value is the round the payload was submitted to.
//! - The fifth value is the round count of that round.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const ENTER_ROUND: &str = "EnterRound";
pub const TRANSITION: &str = "Transition";
pub const ENTER_FINAL_ROUND: &str = "EnterFinalRound";
pub const NEW_PERIOD: &str = "NewPeriod";

pub const RECEIVE_PAYLOAD: &str = "ReceivePayload";
pub const REJECT_PAYLOAD: &str = "RejectPayload";
pub const THRESHOLD_REACHED: &str = "ThresholdReached";

pub const ROUND_TIMEOUT: &str = "RoundTimeout";

pub const COMMIT: &str = "Commit";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for EnterRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |enter_round_event: &EnterRoundEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ENTER_ROUND,
                secs_since_unix_epoch(enter_round_event.timestamp),
                enter_round_event.round_id,
                enter_round_event.round_count
            )
        };
        Box::new(logger)
    }
}

impl Logger for TransitionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |transition_event: &TransitionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                TRANSITION,
                secs_since_unix_epoch(transition_event.timestamp),
                transition_event.from,
                transition_event.event,
                transition_event.to
            )
        };
        Box::new(logger)
    }
}

impl Logger for EnterFinalRoundEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |enter_final_round_event: &EnterFinalRoundEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ENTER_FINAL_ROUND,
                secs_since_unix_epoch(enter_final_round_event.timestamp),
                enter_final_round_event.round_id,
                first_seven_base64_chars(&enter_final_round_event.data_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewPeriodEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_period_event: &NewPeriodEvent| {
            log::info!(
                "{}, {}, {}",
                NEW_PERIOD,
                secs_since_unix_epoch(new_period_event.timestamp),
                new_period_event.period
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceivePayloadEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_payload_event: &ReceivePayloadEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PAYLOAD,
                secs_since_unix_epoch(receive_payload_event.timestamp),
                first_seven_base64_chars(&receive_payload_event.origin.to_bytes()),
                receive_payload_event.round_id,
                receive_payload_event.round_count
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectPayloadEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_payload_event: &RejectPayloadEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REJECT_PAYLOAD,
                secs_since_unix_epoch(reject_payload_event.timestamp),
                first_seven_base64_chars(&reject_payload_event.origin.to_bytes()),
                reject_payload_event.round_id,
                reject_payload_event.reason
            )
        };
        Box::new(logger)
    }
}

impl Logger for ThresholdReachedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |threshold_reached_event: &ThresholdReachedEvent| {
            log::info!(
                "{}, {}, {}, {}",
                THRESHOLD_REACHED,
                secs_since_unix_epoch(threshold_reached_event.timestamp),
                threshold_reached_event.round_id,
                threshold_reached_event.round_count
            )
        };
        Box::new(logger)
    }
}

impl Logger for RoundTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |round_timeout_event: &RoundTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                ROUND_TIMEOUT,
                secs_since_unix_epoch(round_timeout_event.timestamp),
                round_timeout_event.round_id,
                round_timeout_event.round_count,
                round_timeout_event.event
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                commit_event.period,
                commit_event.version,
                first_seven_base64_chars(&commit_event.data_hash.bytes())
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events emitted before the Unix Epoch are logged at 0.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each committed variable is stored in the user-provided key-value
//! store.
//!
//! # List of variables
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Period Start|[`Period`] -> [`SynchronizedData`](crate::synchronized_data::SynchronizedData)|The data each period started with, with an empty log.|
//! |Period Log Length|[`Period`] -> [`u64`]|Number of diffs committed in each period.|
//! |Period Diffs|([`Period`], [`u64`]) -> [`DataUpdates`](crate::synchronized_data::DataUpdates)|The diffs of each period, in the order they were committed.|
//! |Committed Head|[`CommittedHead`](super::pluggables::CommittedHead)|Period, version, log length, and hash of the most recently committed data.|
//!
//! # Keys
//!
//! Single values are stored under a one-byte constant key. Mappings are stored under the
//! concatenation of a one-byte prefix and the little-endian bytes of the mapping's key, e.g., the
//! third diff of period 5 is stored under `PERIOD_DIFFS ++ 5u64.to_le_bytes() ++ 2u64.to_le_bytes()`.

use crate::types::basic::Period;

pub const PERIOD_START: [u8; 1] = [0];
pub const PERIOD_LOG_LEN: [u8; 1] = [1];
pub const PERIOD_DIFFS: [u8; 1] = [2];
pub const COMMITTED_HEAD: [u8; 1] = [3];

pub(crate) fn period_start_key(period: Period) -> Vec<u8> {
    concat(&PERIOD_START, &period.int().to_le_bytes())
}

pub(crate) fn period_log_len_key(period: Period) -> Vec<u8> {
    concat(&PERIOD_LOG_LEN, &period.int().to_le_bytes())
}

pub(crate) fn period_diff_key(period: Period, index: u64) -> Vec<u8> {
    concat(
        &concat(&PERIOD_DIFFS, &period.int().to_le_bytes()),
        &index.to_le_bytes(),
    )
}

/// Takes references to two byteslices and returns a vector containing the bytes of the first one, and
/// then the bytes of the second one.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}

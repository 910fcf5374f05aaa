/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable persistence of committed synchronized data.

use std::fmt::Display;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    synchronized_data::{updates::DataUpdatesBytes, DataError, DataUpdates, SynchronizedData},
    types::basic::{CryptoHash, Period},
};

use super::variables::{self, period_diff_key, period_log_len_key, period_start_key};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Period, version, log length and hash of the most recently committed synchronized data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommittedHead {
    pub period: Period,
    pub version: u64,
    pub log_len: u64,
    pub data_hash: CryptoHash,
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Period Start ↓↓↓ */

    fn period_start(&self, period: Period) -> Result<Option<SynchronizedData>, KVGetError> {
        match self.get(&period_start_key(period)) {
            Some(bytes) => Ok(Some(SynchronizedData::from_bytes(&bytes).map_err(
                |err| KVGetError::DecodeData {
                    key: Key::PeriodStart { period },
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Period Log Length ↓↓↓ */

    fn period_log_len(&self, period: Period) -> Result<u64, KVGetError> {
        match self.get(&period_log_len_key(period)) {
            Some(bytes) => u64::deserialize(&mut &*bytes).map_err(|err| {
                KVGetError::DeserializeValueError {
                    key: Key::PeriodLogLen { period },
                    source: err,
                }
            }),
            None => Ok(0),
        }
    }

    /* ↓↓↓ Period Diffs ↓↓↓ */

    fn period_diff(&self, period: Period, index: u64) -> Result<DataUpdates, KVGetError> {
        let key = Key::PeriodDiff { period, index };
        let bytes = self
            .get(&period_diff_key(period, index))
            .ok_or(KVGetError::ValueExpectedButNotFound { key: key.clone() })?;
        let diff_bytes = DataUpdatesBytes::deserialize(&mut &*bytes).map_err(|err| {
            KVGetError::DeserializeValueError {
                key: key.clone(),
                source: err,
            }
        })?;
        DataUpdates::try_from(diff_bytes).map_err(|err| KVGetError::DecodeData { key, source: err })
    }

    /* ↓↓↓ Committed Head ↓↓↓ */

    fn committed_head(&self) -> Result<Option<CommittedHead>, KVGetError> {
        match self.get(&variables::COMMITTED_HEAD) {
            Some(bytes) => Ok(Some(CommittedHead::deserialize(&mut &*bytes).map_err(
                |err| KVGetError::DeserializeValueError {
                    key: Key::CommittedHead,
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found,
/// 3. The value was deserialized, but does not describe valid synchronized data.
#[derive(Debug, thiserror::Error)]
pub enum KVGetError {
    #[error("value at {key} could not be deserialized: {source}")]
    DeserializeValueError { key: Key, source: std::io::Error },

    #[error("value at {key} was expected but not found")]
    ValueExpectedButNotFound { key: Key },

    #[error("value at {key} is not valid synchronized data: {source}")]
    DecodeData { key: Key, source: DataError },
}

#[derive(Debug, Clone)]
pub enum Key {
    PeriodStart { period: Period },
    PeriodLogLen { period: Period },
    PeriodDiff { period: Period, index: u64 },
    CommittedHead,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::PeriodStart { period } => write!(f, "Period Start for period {}", period),
            Key::PeriodLogLen { period } => write!(f, "Period Log Length for period {}", period),
            Key::PeriodDiff { period, index } => {
                write!(f, "Period Diff {} of period {}", index, period)
            }
            Key::CommittedHead => write!(f, "Committed Head"),
        }
    }
}

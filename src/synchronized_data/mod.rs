/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replicated key-value store that carries agreed state from one round to the next.
//!
//! ## Versions
//!
//! [`SynchronizedData`] is never mutated in place. Every call to [`update`](SynchronizedData::update)
//! or [`create_new_period`](SynchronizedData::create_new_period) returns a new version with a higher
//! [`version`](SynchronizedData::version) number, and leaves the receiver untouched. Versions are
//! built over the persistent maps of the [`im`] crate, so a new version shares almost all of its
//! structure with the version it was derived from.
//!
//! ## Periods
//!
//! Data is organized into periods. Within a period, the data is the period's base entries with the
//! period's log of [`DataUpdates`] applied in order. A new period's base entries are exactly the
//! entries under the [cross-period persisted keys](SynchronizedData::cross_period_persisted_keys) at
//! the end of the previous period; everything else is dropped.
//!
//! ## Replay
//!
//! Since the log of a period records every diff in order, replaying the log against the period's
//! base produces the same data byte for byte (see [`SynchronizedData::replay`]).

pub mod updates;

pub use updates::DataUpdates;

use borsh::{BorshDeserialize, BorshSerialize};
use im::{OrdMap, OrdSet, Vector};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{
    basic::{CryptoHash, Period},
    crypto_primitives::{CryptoHasher, Digest},
};

use updates::DataUpdatesBytes;

/// The agreed-upon state of an app, as seen by a round.
#[derive(Clone, Debug, PartialEq)]
pub struct SynchronizedData {
    period: Period,
    version: u64,
    base: OrdMap<String, Value>,
    log: Vector<DataUpdates>,
    // Base with the log applied. Kept alongside the log so that reads don't have to replay it.
    current: OrdMap<String, Value>,
    cross_period_persisted_keys: OrdSet<String>,
}

impl SynchronizedData {
    /// Create empty data at the initial period, which keeps `cross_period_persisted_keys` across
    /// periods.
    pub fn new<I, S>(cross_period_persisted_keys: I) -> SynchronizedData
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SynchronizedData {
            period: Period::init(),
            version: 0,
            base: OrdMap::new(),
            log: Vector::new(),
            current: OrdMap::new(),
            cross_period_persisted_keys: cross_period_persisted_keys
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }

    /// Get a copy of this data which additionally persists `keys` across periods.
    pub fn with_cross_period_persisted_keys<I, S>(&self, keys: I) -> SynchronizedData
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = self.clone();
        for key in keys {
            data.cross_period_persisted_keys.insert(key.into());
        }
        data
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    /// Get the value of `key`, failing with [`DataError::MissingKey`] if it is not set.
    pub fn get_strict(&self, key: &str) -> Result<&Value, DataError> {
        self.current.get(key).ok_or_else(|| DataError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Get the value of `key` deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, DataError> {
        let value = self.get_strict(key)?;
        T::deserialize(value).map_err(|err| DataError::Deserialize {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.current.contains_key(key)
    }

    pub fn contains_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        keys.into_iter().all(|key| self.contains(key))
    }

    /// Get the keys in `keys` that are not set, in the order they were given.
    pub fn missing_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        keys.into_iter()
            .filter(|key| !self.contains(key))
            .map(str::to_string)
            .collect()
    }

    /// Get an iterator over every entry, in ascending order of keys.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.current.iter()
    }

    /// Get an iterator over the entries this period started with.
    pub fn base(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.base.iter()
    }

    /// Get an iterator over the diffs applied in this period, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DataUpdates> {
        self.log.iter()
    }

    pub fn history_len(&self) -> usize {
        self.log.len()
    }

    /// Get the most recent diff of this period, if any.
    pub fn latest_updates(&self) -> Option<&DataUpdates> {
        self.log.last()
    }

    pub fn cross_period_persisted_keys(&self) -> impl Iterator<Item = &String> {
        self.cross_period_persisted_keys.iter()
    }

    pub fn is_cross_period_persisted(&self, key: &str) -> bool {
        self.cross_period_persisted_keys.contains(key)
    }

    /// Derive the next version of the data by appending `updates` to this period's log.
    pub fn update(&self, updates: DataUpdates) -> SynchronizedData {
        let mut current = self.current.clone();
        apply(&mut current, &updates);

        let mut log = self.log.clone();
        log.push_back(updates);

        SynchronizedData {
            period: self.period,
            version: self.version + 1,
            base: self.base.clone(),
            log,
            current,
            cross_period_persisted_keys: self.cross_period_persisted_keys.clone(),
        }
    }

    /// Derive the first version of the next period. Only entries under cross-period persisted keys
    /// are carried over, and the log starts out empty.
    pub fn create_new_period(&self) -> SynchronizedData {
        let base: OrdMap<String, Value> = self
            .current
            .iter()
            .filter(|(key, _)| self.cross_period_persisted_keys.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        SynchronizedData {
            period: self.period.next(),
            version: self.version + 1,
            current: base.clone(),
            base,
            log: Vector::new(),
            cross_period_persisted_keys: self.cross_period_persisted_keys.clone(),
        }
    }

    /// Apply `log` to `base` in order. Replaying the history of some data against the version the
    /// history started from yields data that is byte-identical to it.
    pub fn replay(
        base: &SynchronizedData,
        log: impl IntoIterator<Item = DataUpdates>,
    ) -> SynchronizedData {
        log.into_iter()
            .fold(base.clone(), |data, updates| data.update(updates))
    }

    /// Get the version of this data at the start of its period, i.e., with an empty log.
    pub fn period_start(&self) -> SynchronizedData {
        SynchronizedData {
            period: self.period,
            version: self.version - self.log.len() as u64,
            base: self.base.clone(),
            log: Vector::new(),
            current: self.base.clone(),
            cross_period_persisted_keys: self.cross_period_persisted_keys.clone(),
        }
    }

    /// Serialize into Borsh bytes. `from_bytes(&data.to_bytes())` equals `data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        SynchronizedDataBytes::from(self).try_to_vec().unwrap()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SynchronizedData, DataError> {
        let data_bytes = SynchronizedDataBytes::try_from_slice(bytes)
            .map_err(|err| DataError::Decode(err.to_string()))?;
        SynchronizedData::try_from(data_bytes)
    }

    /// SHA256 hash of [`to_bytes`](Self::to_bytes).
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.to_bytes());
        CryptoHash::new(hasher.finalize().into())
    }
}

fn apply(entries: &mut OrdMap<String, Value>, updates: &DataUpdates) {
    for (key, value) in updates.inserts() {
        entries.insert(key.clone(), value.clone());
    }
    for key in updates.deletes() {
        entries.remove(key);
    }
}

/// Intermediate representation of [`SynchronizedData`] for serialization with Borsh.
#[derive(BorshSerialize, BorshDeserialize)]
struct SynchronizedDataBytes {
    period: Period,
    version: u64,
    base: Vec<(String, String)>,
    log: Vec<DataUpdatesBytes>,
    cross_period_persisted_keys: Vec<String>,
}

impl From<&SynchronizedData> for SynchronizedDataBytes {
    fn from(data: &SynchronizedData) -> Self {
        SynchronizedDataBytes {
            period: data.period,
            version: data.version,
            base: data
                .base
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            log: data.log.iter().map(DataUpdatesBytes::from).collect(),
            cross_period_persisted_keys: data.cross_period_persisted_keys.iter().cloned().collect(),
        }
    }
}

impl TryFrom<SynchronizedDataBytes> for SynchronizedData {
    type Error = DataError;

    fn try_from(bytes: SynchronizedDataBytes) -> Result<Self, Self::Error> {
        let base = bytes
            .base
            .into_iter()
            .map(|(k, v)| match serde_json::from_str::<Value>(&v) {
                Ok(value) => Ok((k, value)),
                Err(err) => Err(DataError::Deserialize {
                    key: k,
                    reason: err.to_string(),
                }),
            })
            .collect::<Result<OrdMap<String, Value>, DataError>>()?;

        let log = bytes
            .log
            .into_iter()
            .map(DataUpdates::try_from)
            .collect::<Result<Vector<DataUpdates>, DataError>>()?;

        let mut current = base.clone();
        for updates in log.iter() {
            apply(&mut current, updates);
        }

        Ok(SynchronizedData {
            period: bytes.period,
            version: bytes.version,
            base,
            log,
            current,
            cross_period_persisted_keys: bytes.cross_period_persisted_keys.into_iter().collect(),
        })
    }
}

/// Error when reading, deserializing, or decoding [`SynchronizedData`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("synchronized data has no value under key `{key}`")]
    MissingKey { key: String },

    #[error("value under key `{key}` could not be deserialized: {reason}")]
    Deserialize { key: String, reason: String },

    #[error("value for key `{key}` could not be serialized: {reason}")]
    Serialize { key: String, reason: String },

    #[error("malformed synchronized data bytes: {0}")]
    Decode(String),
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-round diff that a round's `end_block` applies to [`SynchronizedData`](super::SynchronizedData).

use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;
use serde_json::Value;

use super::DataError;

/// Set of key-value updates applied to the synchronized data when a round concludes.
///
/// # Uniqueness of Key between `inserts` and `deletes`
///
/// A key is either scheduled for insertion or for deletion, never both: whichever of
/// [`insert`](Self::insert) and [`delete`](Self::delete) was called last wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataUpdates {
    inserts: BTreeMap<String, Value>,
    deletes: BTreeSet<String>,
}

impl DataUpdates {
    pub fn new() -> Self {
        Self {
            inserts: BTreeMap::new(),
            deletes: BTreeSet::new(),
        }
    }

    /// Schedule the insertion of a `key`-`value` pair.
    ///
    /// This cancels the deletion of `key`, if it has been scheduled using [`delete`](Self::delete).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.deletes.remove(&key);
        self.inserts.insert(key, value);
    }

    /// Like [`insert`](Self::insert), but serializes `value` into JSON first.
    pub fn insert_serialize<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), DataError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|err| DataError::Serialize {
            key: key.clone(),
            reason: err.to_string(),
        })?;
        self.insert(key, value);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Schedule the deletion of `key`.
    ///
    /// This cancels the insertion of `key`, if it has been scheduled using [`insert`](Self::insert).
    pub fn delete(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.inserts.remove(&key);
        self.deletes.insert(key);
    }

    pub fn get_insert(&self, key: &str) -> Option<&Value> {
        self.inserts.get(key)
    }

    pub fn contains_delete(&self, key: &str) -> bool {
        self.deletes.contains(key)
    }

    /// Get an iterator over all of the key-value pairs that these updates will insert, in key order.
    pub fn inserts(&self) -> btree_map::Iter<String, Value> {
        self.inserts.iter()
    }

    /// Get an iterator over all of the keys that these updates will delete, in key order.
    pub fn deletes(&self) -> btree_set::Iter<String> {
        self.deletes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Intermediate representation of [`DataUpdates`] for serialization with Borsh.
///
/// Values are stored as their compact JSON rendering. Since JSON objects are kept with their keys in
/// ascending order, the rendering of equal values is byte-identical. Numbers are parsed back to the
/// exact float they were rendered from.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct DataUpdatesBytes {
    inserts: Vec<(String, String)>,
    deletes: Vec<String>,
}

impl From<&DataUpdates> for DataUpdatesBytes {
    fn from(updates: &DataUpdates) -> Self {
        DataUpdatesBytes {
            inserts: updates
                .inserts()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            deletes: updates.deletes().cloned().collect(),
        }
    }
}

impl TryFrom<DataUpdatesBytes> for DataUpdates {
    type Error = DataError;

    fn try_from(bytes: DataUpdatesBytes) -> Result<Self, Self::Error> {
        let inserts = bytes
            .inserts
            .into_iter()
            .map(|(k, v)| match serde_json::from_str::<Value>(&v) {
                Ok(value) => Ok((k, value)),
                Err(err) => Err(DataError::Deserialize {
                    key: k,
                    reason: err.to_string(),
                }),
            })
            .collect::<Result<BTreeMap<String, Value>, DataError>>()?;

        Ok(DataUpdates {
            inserts,
            deletes: bytes.deletes.into_iter().collect(),
        })
    }
}

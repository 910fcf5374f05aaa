/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A volatile, in-memory [`KVStore`] for a [`KVStoreCommitBarrier`](round_abci::persistence::KVStoreCommitBarrier)
//! to commit into.
//!
//! The store holds the start of every committed period, the diffs committed in each period, and the
//! committed head. Clones share the same map, so a test can keep a clone and inspect what a replica
//! committed after the replica has been dropped.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use round_abci::persistence::pluggables::{KVGet, KVStore, WriteBatch};

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Clone)]
pub(crate) struct MemDB(Arc<Mutex<Entries>>);

impl MemDB {
    pub(crate) fn new() -> MemDB {
        MemDB(Arc::new(Mutex::new(BTreeMap::new())))
    }

    /// Number of entries in the store.
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Number of entries whose key starts with `prefix`, e.g., one of the
    /// [variable prefixes](round_abci::persistence::variables).
    pub(crate) fn count_with_prefix(&self, prefix: &[u8]) -> usize {
        self.entries()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .count()
    }

    fn entries(&self) -> MutexGuard<Entries> {
        self.0.lock().unwrap()
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;
    type Snapshot<'a> = MemDBSnapshot<'a>;

    fn write(&mut self, wb: Self::WriteBatch) {
        let mut entries = self.entries();
        for (key, value) in wb.0 {
            match value {
                Some(value) => entries.insert(key, value),
                None => entries.remove(&key),
            };
        }
    }

    fn clear(&mut self) {
        self.entries().clear();
    }

    fn snapshot<'b>(&'b self) -> MemDBSnapshot<'b> {
        MemDBSnapshot(self.entries())
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries().get(key).cloned()
    }
}

/// Pending writes, keyed by the entry they touch. `None` deletes the entry.
pub(crate) struct MemWriteBatch(BTreeMap<Vec<u8>, Option<Vec<u8>>>);

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch(BTreeMap::new())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.insert(key.to_vec(), None);
    }
}

/// A consistent view of a [`MemDB`], held for as long as the commit barrier reads a period.
pub(crate) struct MemDBSnapshot<'a>(MutexGuard<'a, Entries>);

impl KVGet for MemDBSnapshot<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.get(key).cloned()
    }
}

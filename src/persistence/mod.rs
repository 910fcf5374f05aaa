/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable commitment of synchronized data.
//!
//! The library user provides a key-value store by implementing the [pluggable](pluggables) traits
//! [`KVStore`](pluggables::KVStore), [`KVGet`](pluggables::KVGet) and
//! [`WriteBatch`](pluggables::WriteBatch). [`KVStoreCommitBarrier`](commit_barrier::KVStoreCommitBarrier)
//! then lays committed data out in the store as described in [`variables`].

pub mod commit_barrier;

pub mod pluggables;

pub mod variables;

pub use commit_barrier::{CommitBarrier, CommitRejected, Committed, KVStoreCommitBarrier};

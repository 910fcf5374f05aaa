/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The barrier between the round engine and durable agreement on its output.
//!
//! After every transition that changes the synchronized data, the replica proposes the new data to
//! a [`CommitBarrier`], and only moves on once the barrier has committed it. [`KVStoreCommitBarrier`]
//! is the barrier that commits to a user-provided [`KVStore`]: it appends the diffs the data gained
//! since the last commit, so that each period can later be reloaded with
//! [`load_period`](KVStoreCommitBarrier::load_period) and replayed.

use borsh::BorshSerialize;

use crate::{
    synchronized_data::{updates::DataUpdatesBytes, DataUpdates, SynchronizedData},
    types::basic::{CryptoHash, Period},
};

use super::{
    pluggables::{CommittedHead, KVGet, KVGetError, KVStore, WriteBatch},
    variables::{self, period_diff_key, period_log_len_key, period_start_key},
};

/// Proof that some synchronized data was durably committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Committed {
    pub period: Period,
    pub version: u64,
    pub data_hash: CryptoHash,
    /// Number of diffs written by this commit. Zero if the data had already been committed.
    pub new_diffs: u64,
}

pub trait CommitBarrier: Send + 'static {
    /// Durably commit `data`, which must extend the data committed last.
    fn propose_commit(&mut self, data: &SynchronizedData) -> Result<Committed, CommitRejected>;
}

/// A [`CommitBarrier`] that appends committed diffs to a [`KVStore`].
#[derive(Clone)]
pub struct KVStoreCommitBarrier<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore> KVStoreCommitBarrier<K> {
    pub fn new(kv_store: K) -> Self {
        Self { kv_store }
    }

    pub fn kv_store(&self) -> &K {
        &self.kv_store
    }

    pub fn committed_head(&self) -> Result<Option<CommittedHead>, KVGetError> {
        self.kv_store.committed_head()
    }

    /// Reload the data of `period` as of its latest committed diff, by replaying the period's
    /// committed log against the data the period started with.
    pub fn load_period(&self, period: Period) -> Result<Option<SynchronizedData>, KVGetError> {
        let snapshot = self.kv_store.snapshot();
        let start = match snapshot.period_start(period)? {
            Some(start) => start,
            None => return Ok(None),
        };
        let log_len = snapshot.period_log_len(period)?;
        let log = (0..log_len)
            .map(|index| snapshot.period_diff(period, index))
            .collect::<Result<Vec<DataUpdates>, KVGetError>>()?;
        Ok(Some(SynchronizedData::replay(&start, log)))
    }
}

impl<K: KVStore> KVStoreCommitBarrier<K> {
    // Whether `data` starts its period where the committed head's period started, and its log
    // begins with every committed diff.
    fn extends_committed(&self, head: &CommittedHead, data: &SynchronizedData) -> Result<bool, KVGetError> {
        if (data.history_len() as u64) < head.log_len {
            return Ok(false);
        }
        let committed_start = self.kv_store.period_start(head.period)?;
        if committed_start.map(|start| start.hash()) != Some(data.period_start().hash()) {
            return Ok(false);
        }
        for (index, diff) in data.history().take(head.log_len as usize).enumerate() {
            if self.kv_store.period_diff(head.period, index as u64)? != *diff {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<K: KVStore> CommitBarrier for KVStoreCommitBarrier<K> {
    fn propose_commit(&mut self, data: &SynchronizedData) -> Result<Committed, CommitRejected> {
        let data_hash = data.hash();
        let head = self.kv_store.committed_head()?;

        // Index of the first diff of `data` that has not been committed yet.
        let first_new_diff = match head {
            Some(head) if head.data_hash == data_hash => {
                return Ok(Committed {
                    period: data.period(),
                    version: data.version(),
                    data_hash,
                    new_diffs: 0,
                })
            }
            Some(head) if data.period() < head.period || data.version() <= head.version => {
                return Err(CommitRejected::Stale {
                    committed_period: head.period,
                    committed_version: head.version,
                    proposed_period: data.period(),
                    proposed_version: data.version(),
                })
            }
            Some(head) if data.period() == head.period => {
                if !self.extends_committed(&head, data)? {
                    return Err(CommitRejected::Diverged {
                        period: head.period,
                        committed_version: head.version,
                        proposed_version: data.version(),
                    });
                }
                head.log_len
            }
            Some(head) if data.period() != head.period.next() => {
                return Err(CommitRejected::PeriodGap {
                    committed_period: head.period,
                    proposed_period: data.period(),
                })
            }
            // The first commit, or the first commit of a new period.
            _ => 0,
        };

        let mut wb = CommitWriteBatch::<K::WriteBatch>::new();
        if first_new_diff == 0 {
            wb.set_period_start(&data.period_start());
        }
        let log_len = data.history_len() as u64;
        for (index, diff) in data.history().enumerate().skip(first_new_diff as usize) {
            wb.set_period_diff(data.period(), index as u64, diff);
        }
        wb.set_period_log_len(data.period(), log_len);
        wb.set_committed_head(&CommittedHead {
            period: data.period(),
            version: data.version(),
            log_len,
            data_hash,
        });
        self.kv_store.write(wb.0);

        Ok(Committed {
            period: data.period(),
            version: data.version(),
            data_hash,
            new_diffs: log_len - first_new_diff,
        })
    }
}

/// Wrapper around a [`WriteBatch`] that knows where every committed variable is stored.
pub(crate) struct CommitWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> CommitWriteBatch<W> {
    pub(crate) fn new() -> CommitWriteBatch<W> {
        CommitWriteBatch(W::new())
    }

    pub(crate) fn set_period_start(&mut self, start: &SynchronizedData) {
        self.0
            .set(&period_start_key(start.period()), &start.to_bytes());
    }

    pub(crate) fn set_period_log_len(&mut self, period: Period, log_len: u64) {
        self.0
            .set(&period_log_len_key(period), &log_len.try_to_vec().unwrap());
    }

    pub(crate) fn set_period_diff(&mut self, period: Period, index: u64, diff: &DataUpdates) {
        self.0.set(
            &period_diff_key(period, index),
            &DataUpdatesBytes::from(diff).try_to_vec().unwrap(),
        );
    }

    pub(crate) fn set_committed_head(&mut self, head: &CommittedHead) {
        self.0
            .set(&variables::COMMITTED_HEAD, &head.try_to_vec().unwrap());
    }
}

/// Reasons a [`CommitBarrier`] refuses to commit some synchronized data.
#[derive(Debug, thiserror::Error)]
pub enum CommitRejected {
    #[error("data at period {proposed_period} version {proposed_version} is older than the committed period {committed_period} version {committed_version}")]
    Stale {
        committed_period: Period,
        committed_version: u64,
        proposed_period: Period,
        proposed_version: u64,
    },

    #[error("data at version {proposed_version} does not extend the data committed at version {committed_version} of period {period}")]
    Diverged {
        period: Period,
        committed_version: u64,
        proposed_version: u64,
    },

    #[error("data at period {proposed_period} skips periods after the committed period {committed_period}")]
    PeriodGap {
        committed_period: Period,
        proposed_period: Period,
    },

    #[error(transparent)]
    Store(#[from] KVGetError),
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [ParticipantSet] type and the consensus threshold it implies.

use std::slice;

use super::crypto_primitives::VerifyingKey;

/// Identities of the replicas whose payloads count towards a round's threshold.
///
/// The participant set maintains its members in ascending order of their [public keys](VerifyingKey),
/// so that iterating over it yields the same order on every replica.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantSet {
    // The verifying keys of participants are included here in ascending order of their bytes.
    participants: Vec<VerifyingKey>,
}

impl ParticipantSet {
    pub fn new() -> ParticipantSet {
        Self {
            participants: Vec::new(),
        }
    }

    /// Insert `participant` into the set. Inserting an existing participant is a no-op.
    pub fn put(&mut self, participant: &VerifyingKey) {
        let participant_bytes = participant.to_bytes();
        if let Err(insert_pos) = self
            .participants
            .binary_search_by(|p| p.to_bytes().cmp(&participant_bytes))
        {
            self.participants.insert(insert_pos, *participant);
        }
    }

    pub fn remove(&mut self, participant: &VerifyingKey) -> Option<VerifyingKey> {
        self.position(participant)
            .map(|pos| self.participants.remove(pos))
    }

    pub fn contains(&self, participant: &VerifyingKey) -> bool {
        self.position(participant).is_some()
    }

    pub fn position(&self, participant: &VerifyingKey) -> Option<usize> {
        let participant_bytes = participant.to_bytes();
        self.participants
            .binary_search_by(|p| p.to_bytes().cmp(&participant_bytes))
            .ok()
    }

    /// Get an iterator through participants' verifying keys which walks through them in ascending order.
    pub fn participants(&self) -> slice::Iter<VerifyingKey> {
        self.participants.iter()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of matching payloads a threshold round needs before it can conclude.
    ///
    /// Computed as `floor(2n/3) + 1`, which equals `ceil((2n+1)/3)` for every `n`: the smallest
    /// number of replicas such that any two such groups intersect in at least one honest replica when
    /// at most `floor((n-1)/3)` are faulty. Every round uses this one formula.
    ///
    /// An empty participant set has a threshold of 1, so that no round can ever be concluded by it.
    pub fn consensus_threshold(&self) -> usize {
        (self.len() * 2) / 3 + 1
    }
}

impl FromIterator<VerifyingKey> for ParticipantSet {
    fn from_iter<T: IntoIterator<Item = VerifyingKey>>(iter: T) -> Self {
        let mut participant_set = ParticipantSet::new();
        for participant in iter {
            participant_set.put(&participant);
        }
        participant_set
    }
}

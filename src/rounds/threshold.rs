/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The "collect same until threshold" voting primitive.
//!
//! A [`ThresholdAgreementRound`] keeps at most one vote per participant. Its threshold status and
//! most-voted content are always recomputed from the votes it currently holds, counted by the
//! canonical bytes of their content. Counting is therefore commutative: the order in which payloads
//! arrive never affects whether the threshold is reached, nor which content wins.
//!
//! With a threshold `t = floor(2n/3) + 1`, `2t > n`, so at most one content can reach the threshold
//! at any time.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    synchronized_data::{DataUpdates, SynchronizedData},
    types::{
        basic::{Event, RoundCount, RoundId},
        participants::ParticipantSet,
        payload::{Payload, PayloadContent},
    },
};

use super::{AgreedOutcome, PayloadError, Round, RoundError, RoundLogic, RoundStatus};

/// What happens when a participant submits a second payload to the same round instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevotePolicy {
    /// The latest payload from a sender replaces its earlier one.
    #[default]
    Overwrite,

    /// A second payload from a sender is rejected with [`PayloadError::DuplicateSender`].
    Reject,
}

pub struct ThresholdAgreementRound {
    round_id: RoundId,
    round_count: RoundCount,
    logic: Arc<dyn RoundLogic>,
    data: SynchronizedData,
    participants: ParticipantSet,
    threshold: usize,
    revote_policy: RevotePolicy,
    // Keyed by the bytes of the sender's verifying key.
    votes: BTreeMap<[u8; 32], PayloadContent>,
    concluded: bool,
}

impl ThresholdAgreementRound {
    pub fn new(
        logic: Arc<dyn RoundLogic>,
        round_count: RoundCount,
        data: SynchronizedData,
        participants: ParticipantSet,
        revote_policy: RevotePolicy,
    ) -> Self {
        Self {
            round_id: logic.round_id(),
            round_count,
            logic,
            data,
            threshold: participants.consensus_threshold(),
            participants,
            revote_policy,
            votes: BTreeMap::new(),
            concluded: false,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    /// Number of participants whose vote is currently held.
    pub fn num_votes(&self) -> usize {
        self.votes.len()
    }

    /// Get the content with the most votes, and its number of votes.
    ///
    /// Ties are broken in favour of the content with the smallest canonical bytes, so that the result
    /// does not depend on arrival order.
    pub fn most_voted(&self) -> Option<(&PayloadContent, usize)> {
        let mut tally: BTreeMap<&PayloadContent, usize> = BTreeMap::new();
        for content in self.votes.values() {
            *tally.entry(content).or_insert(0) += 1;
        }

        // `max_by_key` returns the last maximum, so iterate in reverse to keep the smallest content.
        tally
            .into_iter()
            .rev()
            .max_by_key(|(_, votes)| *votes)
    }
}

impl Round for ThresholdAgreementRound {
    fn round_id(&self) -> &RoundId {
        &self.round_id
    }

    fn round_count(&self) -> RoundCount {
        self.round_count
    }

    fn status(&self) -> RoundStatus {
        if self.concluded {
            RoundStatus::Concluded
        } else if self.threshold_reached() {
            RoundStatus::ThresholdReached
        } else {
            RoundStatus::Collecting
        }
    }

    fn synchronized_data(&self) -> &SynchronizedData {
        &self.data
    }

    fn submit(&mut self, payload: Payload) -> Result<(), PayloadError> {
        if self.concluded {
            return Err(PayloadError::RoundConcluded(self.round_id.clone()));
        }

        if payload.round_id != self.round_id || payload.round_count != self.round_count {
            return Err(PayloadError::WrongRound {
                expected_round: self.round_id.clone(),
                expected_count: self.round_count,
                got_round: payload.round_id,
                got_count: payload.round_count,
            });
        }

        if !self.participants.contains(&payload.sender) {
            return Err(PayloadError::UnknownSender);
        }

        if !payload.is_authentic() {
            return Err(PayloadError::InvalidSignature);
        }

        let sender = payload.sender.to_bytes();
        if self.revote_policy == RevotePolicy::Reject && self.votes.contains_key(&sender) {
            return Err(PayloadError::DuplicateSender);
        }

        self.votes.insert(sender, payload.content);
        Ok(())
    }

    fn threshold_reached(&self) -> bool {
        self.most_voted()
            .is_some_and(|(_, votes)| votes >= self.threshold)
    }

    fn end_block(&mut self) -> Result<Option<(SynchronizedData, Event)>, RoundError> {
        if self.concluded {
            return Err(RoundError::AlreadyConcluded(self.round_id.clone()));
        }

        let outcome = match self.most_voted() {
            Some((content, votes)) if votes >= self.threshold => AgreedOutcome {
                round_id: self.round_id.clone(),
                content: content.clone(),
                votes,
            },
            _ => return Ok(None),
        };

        let mut updates = DataUpdates::new();
        updates.insert(
            self.logic.payload_attribute(),
            outcome.content.value().clone(),
        );
        let staged = self.data.update(updates.clone());

        let (logic_updates, event) = self.logic.end_block(&staged, &outcome)?;
        for (key, value) in logic_updates.inserts() {
            updates.insert(key.clone(), value.clone());
        }
        for key in logic_updates.deletes() {
            updates.delete(key.clone());
        }

        let mut next = self.data.update(updates);
        if self.logic.opens_new_period(&event) {
            next = next.create_new_period();
        }

        self.concluded = true;
        Ok(Some((next, event)))
    }
}

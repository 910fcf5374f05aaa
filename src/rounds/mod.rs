/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rounds: the states of an [AbciApp](crate::abci_app::AbciApp)'s transition graph.
//!
//! A round instance lives from the moment the engine enters it until the engine leaves it. While it
//! lives it goes through the statuses of [`RoundStatus`] in order, and never goes back:
//!
//! ```text
//! Collecting ──▶ ThresholdReached ──▶ Concluded
//! ```
//!
//! Two kinds of rounds exist, registered per round id in a [`RoundKind`] table:
//! 1. [`ThresholdAgreementRound`]: collects [payloads](crate::types::payload::Payload) until a
//!    threshold of participants agree on the same content, then asks its [`RoundLogic`] for the
//!    next synchronized data and event.
//! 2. [`DegenerateRound`]: a terminal round that accepts no payloads and never ends by itself.

pub mod degenerate;

pub mod threshold;

pub use degenerate::DegenerateRound;
pub use threshold::{RevotePolicy, ThresholdAgreementRound};

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    synchronized_data::{DataError, DataUpdates, SynchronizedData},
    types::{
        basic::{Event, RoundCount, RoundId},
        participants::ParticipantSet,
        payload::{Payload, PayloadContent},
    },
};

/// Where a round instance is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    Collecting,
    ThresholdReached,
    Concluded,
}

/// Capabilities shared by every round instance, whatever its kind.
pub trait Round: Send {
    fn round_id(&self) -> &RoundId;

    /// The engine's round counter at the time this instance was entered.
    fn round_count(&self) -> RoundCount;

    fn status(&self) -> RoundStatus;

    /// The synchronized data this instance was entered with.
    fn synchronized_data(&self) -> &SynchronizedData;

    /// Record `payload`. A rejected payload leaves the round exactly as it was.
    fn submit(&mut self, payload: Payload) -> Result<(), PayloadError>;

    fn threshold_reached(&self) -> bool;

    /// Conclude the round if its threshold has been reached, returning the next synchronized data and
    /// the event to transition with. Returns `Ok(None)` while the threshold has not been reached.
    fn end_block(&mut self) -> Result<Option<(SynchronizedData, Event)>, RoundError>;
}

/// The content that a threshold of participants agreed on in a round instance.
#[derive(Clone, Debug, PartialEq)]
pub struct AgreedOutcome {
    pub round_id: RoundId,
    pub content: PayloadContent,
    /// Number of participants that submitted `content`.
    pub votes: usize,
}

impl AgreedOutcome {
    /// Deserialize the agreed content into `T`, failing with [`RoundError::InvalidContent`].
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, RoundError> {
        self.content
            .parse()
            .map_err(|err| RoundError::InvalidContent {
                round_id: self.round_id.clone(),
                reason: err.to_string(),
            })
    }
}

/// The decision function of a round type.
///
/// ## Purity
///
/// `end_block` must be a pure function of its arguments: no I/O, no clocks, no randomness and no
/// shared state. Every replica calls it with the same arguments, and must get the same result.
pub trait RoundLogic: Send + Sync {
    fn round_id(&self) -> RoundId;

    /// The synchronized data key that the agreed content is stored under.
    fn payload_attribute(&self) -> &str;

    /// Every event that `end_block` can return. Used to check that the transition graph is total.
    fn events(&self) -> Vec<Event>;

    /// Decide the round's outcome.
    ///
    /// `data` is the data the round was entered with, with the agreed content already stored under
    /// [`payload_attribute`](Self::payload_attribute). The returned updates are applied on top of
    /// that, in the same diff.
    fn end_block(
        &self,
        data: &SynchronizedData,
        outcome: &AgreedOutcome,
    ) -> Result<(DataUpdates, Event), RoundError>;

    /// Whether ending with `event` closes the current period. If it does, the next round is entered
    /// with the first version of the next period, which keeps only cross-period persisted keys.
    fn opens_new_period(&self, _event: &Event) -> bool {
        false
    }
}

/// Startup-time registry entry describing how to instantiate the round with a given id.
#[derive(Clone)]
pub enum RoundKind {
    Agreement(Arc<dyn RoundLogic>),
    Degenerate,
}

impl RoundKind {
    pub fn agreement(logic: impl RoundLogic + 'static) -> RoundKind {
        RoundKind::Agreement(Arc::new(logic))
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, RoundKind::Degenerate)
    }

    /// Every event a round of this kind can emit on its own. Degenerate rounds emit none.
    pub fn events(&self) -> Vec<Event> {
        match self {
            RoundKind::Agreement(logic) => logic.events(),
            RoundKind::Degenerate => Vec::new(),
        }
    }

    pub(crate) fn instantiate(
        &self,
        round_id: RoundId,
        round_count: RoundCount,
        data: SynchronizedData,
        participants: ParticipantSet,
        revote_policy: RevotePolicy,
    ) -> Box<dyn Round> {
        match self {
            RoundKind::Agreement(logic) => Box::new(ThresholdAgreementRound::new(
                Arc::clone(logic),
                round_count,
                data,
                participants,
                revote_policy,
            )),
            RoundKind::Degenerate => Box::new(DegenerateRound::new(round_id, round_count, data)),
        }
    }
}

impl std::fmt::Debug for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundKind::Agreement(logic) => write!(f, "Agreement({})", logic.round_id()),
            RoundKind::Degenerate => write!(f, "Degenerate"),
        }
    }
}

/// Reasons a payload is dropped by a round. A dropped payload does not count towards the threshold,
/// and its sender may submit again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is for round {got_round} #{got_count}, but the current round is {expected_round} #{expected_count}")]
    WrongRound {
        expected_round: RoundId,
        expected_count: RoundCount,
        got_round: RoundId,
        got_count: RoundCount,
    },

    #[error("payload sender is not a participant")]
    UnknownSender,

    #[error("payload signature does not verify against its sender")]
    InvalidSignature,

    #[error("sender has already submitted a payload in this round")]
    DuplicateSender,

    #[error("round {0} does not accept payloads")]
    NotAccepting(RoundId),

    #[error("round {0} has already concluded")]
    RoundConcluded(RoundId),
}

/// Fatal errors in a round's decision function. These indicate that the transition graph and the
/// data model have drifted apart, and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("agreed content of round {round_id} is malformed: {reason}")]
    InvalidContent { round_id: RoundId, reason: String },

    #[error("round {round_id} cannot handle tx_state `{tx_state}`")]
    UnexpectedTxState { round_id: RoundId, tx_state: String },

    #[error("round {0} has already concluded")]
    AlreadyConcluded(RoundId),
}

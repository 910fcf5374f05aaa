/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Terminal rounds.

use crate::{
    synchronized_data::SynchronizedData,
    types::{
        basic::{Event, RoundCount, RoundId},
        payload::Payload,
    },
};

use super::{PayloadError, Round, RoundError, RoundStatus};

/// A round with no decision function. It accepts no payloads and never ends by itself.
///
/// Within its own app a degenerate round has no outgoing edges, so entering it finishes the app.
/// Once [chained](crate::abci_app::chain) into a larger app, the engine passes through it along the
/// single edge composition gave it.
pub struct DegenerateRound {
    round_id: RoundId,
    round_count: RoundCount,
    data: SynchronizedData,
}

impl DegenerateRound {
    pub fn new(round_id: RoundId, round_count: RoundCount, data: SynchronizedData) -> Self {
        Self {
            round_id,
            round_count,
            data,
        }
    }
}

impl Round for DegenerateRound {
    fn round_id(&self) -> &RoundId {
        &self.round_id
    }

    fn round_count(&self) -> RoundCount {
        self.round_count
    }

    fn status(&self) -> RoundStatus {
        RoundStatus::Concluded
    }

    fn synchronized_data(&self) -> &SynchronizedData {
        &self.data
    }

    fn submit(&mut self, _payload: Payload) -> Result<(), PayloadError> {
        Err(PayloadError::NotAccepting(self.round_id.clone()))
    }

    fn threshold_reached(&self) -> bool {
        false
    }

    fn end_block(&mut self) -> Result<Option<(SynchronizedData, Event)>, RoundError> {
        Ok(None)
    }
}

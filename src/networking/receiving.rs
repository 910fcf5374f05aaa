/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::types::{
    basic::{BufferSize, RoundCount},
    crypto_primitives::VerifyingKey,
    payload::Payload,
};

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and forwards them to the
/// returned receiver, from which the replica thread reads them through a [`MessageStub`].
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<(VerifyingKey, Message)>) {
    let (to_msg_receiver, msg_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        if let Some((origin, msg)) = network.recv() {
            let _ = to_msg_receiver.send((origin, msg));
        } else {
            thread::yield_now()
        }
    });
    (poller_thread, msg_receiver)
}

/// A receiving end for [`Message`]s.
///
/// ## Round-aware buffering
///
/// `MessageStub` inspects the round count of incoming payloads to decide whether to:
/// 1. Return it from `recv` for immediate processing, if it is for the current round instance.
/// 2. Place it in its buffer for future processing, if it is for a later round instance. Peers that
///    concluded the current round slightly earlier than this replica already vote in the next one.
/// 3. Discard it, if it is for an earlier round instance, which has concluded and can no longer
///    change.
///
/// Block timestamps are not tied to a round instance, and are returned immediately.
///
/// ## Buffer management
///
/// The buffer holds at most the number of payloads given to [`new`](Self::new). When it is full, a
/// payload for a nearer round instance displaces the payload for the farthest one. A payload for a
/// round instance at least as far as every buffered one is dropped instead.
pub(crate) struct MessageStub {
    receiver: Receiver<(VerifyingKey, Message)>,
    payload_buffer: PayloadBuffer,
}

impl MessageStub {
    pub(crate) fn new(
        receiver: Receiver<(VerifyingKey, Message)>,
        payload_buffer_capacity: BufferSize,
    ) -> MessageStub {
        Self {
            receiver,
            payload_buffer: PayloadBuffer::new(payload_buffer_capacity),
        }
    }

    /// Receive a block timestamp, or a payload for the round instance `cur_round_count`, waiting until
    /// `deadline` at the latest.
    pub(crate) fn recv(
        &mut self,
        cur_round_count: RoundCount,
        deadline: Instant,
    ) -> Result<(VerifyingKey, Message), MessageReceiveError> {
        self.payload_buffer.remove_expired_payloads(cur_round_count);

        if let Some((origin, payload)) = self.payload_buffer.get_payload(&cur_round_count) {
            return Ok((origin, Message::Payload(payload)));
        }

        while Instant::now() < deadline {
            match self.receiver.recv_timeout(deadline - Instant::now()) {
                Ok((origin, msg)) => match msg.round_count() {
                    Some(round_count) if round_count > cur_round_count => {
                        if let Message::Payload(payload) = msg {
                            self.payload_buffer.insert(origin, payload);
                        }
                    }
                    Some(round_count) if round_count < cur_round_count => (),
                    _ => return Ok((origin, msg)),
                },
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MessageReceiveError::Disconnected)
                }
            }
        }

        Err(MessageReceiveError::Timeout)
    }
}

#[derive(Debug)]
pub(crate) enum MessageReceiveError {
    Timeout,
    Disconnected,
}

/// Buffer for payloads of future round instances, bounded by the number of payloads it holds.
struct PayloadBuffer {
    capacity: BufferSize,
    buffer: BTreeMap<RoundCount, VecDeque<(VerifyingKey, Payload)>>,
    len: usize,
}

impl PayloadBuffer {
    fn new(capacity: BufferSize) -> Self {
        Self {
            capacity,
            buffer: BTreeMap::new(),
            len: 0,
        }
    }

    /// Try inserting the payload into the buffer, evicting a payload of the farthest round instance if
    /// the buffer is full and that instance is farther than the new payload's.
    ///
    /// Returns whether the payload was inserted.
    fn insert(&mut self, origin: VerifyingKey, payload: Payload) -> bool {
        if self.len >= self.capacity.int() {
            let farthest = self.buffer.keys().next_back().copied();
            match farthest {
                Some(farthest) if payload.round_count < farthest => self.remove_farthest_payload(),
                _ => return false,
            }
        }

        self.buffer
            .entry(payload.round_count)
            .or_default()
            .push_back((origin, payload));
        self.len += 1;
        true
    }

    /// If there are payloads for this round instance in the buffer, remove and return the one at the
    /// front of the queue.
    fn get_payload(&mut self, round_count: &RoundCount) -> Option<(VerifyingKey, Payload)> {
        let queue = self.buffer.get_mut(round_count)?;
        let payload = queue.pop_front();
        if queue.is_empty() {
            self.buffer.remove(round_count);
        }
        if payload.is_some() {
            self.len -= 1;
        }
        payload
    }

    fn remove_farthest_payload(&mut self) {
        if let Some(mut entry) = self.buffer.last_entry() {
            if entry.get_mut().pop_back().is_some() {
                self.len -= 1;
            }
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Remove all payloads for round instances before the current one.
    fn remove_expired_payloads(&mut self, cur_round_count: RoundCount) {
        self.buffer = self.buffer.split_off(&cur_round_count);
        self.len = self.buffer.values().map(VecDeque::len).sum();
    }
}

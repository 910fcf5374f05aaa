/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use crate::types::crypto_primitives::VerifyingKey;

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Send a message to all peers without blocking.
    fn broadcast(&mut self, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

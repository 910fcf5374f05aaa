/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Payloads: a single replica's signed vote for a single round instance.
//!
//! A [`Payload`] is immutable once constructed. It is attributable to its sender through an Ed25519
//! signature over the [`message_bytes`](SignedMessage::message_bytes) of the payload, so a peer
//! cannot forge a vote on behalf of another replica.

use std::{
    cmp::Ordering,
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
};

use borsh::BorshSerialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    basic::{RoundCount, RoundId, SignatureBytes},
    crypto_primitives::{Keypair, Signature, Verifier, VerifyingKey},
};

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a `VerifyingKey`.
pub trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature
    /// of the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        verifying_key
            .verify(&self.message_bytes(), &signature)
            .is_ok()
    }
}

/// The round-specific value carried by a [`Payload`].
///
/// Content is an arbitrary JSON value. Two contents are equal exactly when their canonical
/// encodings are equal: compact JSON with object keys in ascending order. Threshold counting keys on
/// this encoding, so the order in which a behaviour inserted fields never affects agreement.
#[derive(Clone)]
pub struct PayloadContent {
    value: Value,
    canonical: Vec<u8>,
}

impl PayloadContent {
    pub fn new(value: Value) -> PayloadContent {
        // `serde_json::Map` is ordered by key, so the compact rendering is already canonical.
        let canonical = value.to_string().into_bytes();
        PayloadContent { value, canonical }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Deserialize the content into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }

    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical
    }
}

impl From<Value> for PayloadContent {
    fn from(value: Value) -> Self {
        PayloadContent::new(value)
    }
}

impl PartialEq for PayloadContent {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for PayloadContent {}

impl PartialOrd for PayloadContent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PayloadContent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl Hash for PayloadContent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state)
    }
}

impl Debug for PayloadContent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadContent({})", self.value)
    }
}

/// A replica's vote for one round instance, identified by `(round_id, round_count)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    pub sender: VerifyingKey,
    pub round_id: RoundId,
    pub round_count: RoundCount,
    pub content: PayloadContent,
    pub signature: SignatureBytes,
}

impl Payload {
    /// Create a `Payload` for the round instance `(round_id, round_count)`, signed by `keypair`.
    pub fn new(
        keypair: &Keypair,
        round_id: RoundId,
        round_count: RoundCount,
        content: impl Into<PayloadContent>,
    ) -> Payload {
        let content = content.into();
        let message = Self::signing_bytes(&round_id, round_count, &content);
        let signature = keypair.sign(&message);

        Payload {
            sender: keypair.public(),
            round_id,
            round_count,
            content,
            signature,
        }
    }

    /// Check that this payload was signed by its claimed `sender`.
    pub fn is_authentic(&self) -> bool {
        self.is_correct(&self.sender)
    }

    fn signing_bytes(round_id: &RoundId, round_count: RoundCount, content: &PayloadContent) -> Vec<u8> {
        (
            round_id.as_str().to_string(),
            round_count.int(),
            content.canonical_bytes().to_vec(),
        )
            .try_to_vec()
            .unwrap()
    }
}

impl SignedMessage for Payload {
    fn message_bytes(&self) -> Vec<u8> {
        Self::signing_bytes(&self.round_id, self.round_count, &self.content)
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

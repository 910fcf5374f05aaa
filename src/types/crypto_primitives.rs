/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Hashing and signing primitives.
//!
//! Synchronized data is hashed with SHA-256 ([`sha2`]), and payloads are signed with Ed25519
//! ([`ed25519_dalek`]). Both are re-exported here so that users of this crate need not depend on
//! either crate directly.

use super::basic::SignatureBytes;

pub use sha2::{Digest, Sha256 as CryptoHasher};

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// The signing key of a replica, used to sign the payloads it votes with.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign `message`, typically the [message bytes](super::payload::SignedMessage::message_bytes)
    /// of a payload.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// The key other replicas identify this replica by.
    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}

impl From<SigningKey> for Keypair {
    fn from(signing_key: SigningKey) -> Self {
        Keypair::new(signing_key)
    }
}

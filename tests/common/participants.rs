/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use rand_core::OsRng;
use round_abci::types::{
    crypto_primitives::{Keypair, SigningKey},
    participants::ParticipantSet,
};

pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

pub(crate) fn keypairs(n: usize) -> Vec<Keypair> {
    signing_keys(n).into_iter().map(Keypair::new).collect()
}

pub(crate) fn participant_set(keypairs: &[Keypair]) -> ParticipantSet {
    keypairs.iter().map(Keypair::public).collect()
}

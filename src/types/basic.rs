/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types that are passed around and inspected by every layer of the engine, but have no
//! active behavior of their own. These follow the newtype pattern.
//!
//! [`RoundId`] and [`Event`] are the names that make up an [AbciApp](crate::abci_app::AbciApp)'s
//! transition graph. Both are string-backed so that constants can be declared with
//! [`RoundId::new_static`] and [`Event::new_static`], while values received from peers can still be
//! constructed at runtime.

use std::{
    borrow::Cow,
    fmt::{self, Debug, Display, Formatter},
    ops::Add,
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Unique name of a round type. Two apps may never declare rounds with the same id if they are to
/// be [chained](crate::abci_app::chain) together.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundId(Cow<'static, str>);

impl RoundId {
    pub const fn new_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoundId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for RoundId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RoundId({})", self.0)
    }
}

/// Outcome name emitted by a round's `end_block`, or synthesised by the engine on timeout.
///
/// Events are scoped to the round that emits them: the transition function is keyed by
/// `(RoundId, Event)`, so two apps may reuse the same event name with different meanings.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event(Cow<'static, str>);

impl Event {
    pub const fn new_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.0)
    }
}

/// Operational epoch of the [SynchronizedData](crate::synchronized_data::SynchronizedData). A new
/// period starts at every reset-style transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Period(u64);

impl Period {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Number of rounds an engine has entered since it started. Every round instance gets a distinct
/// count, so payloads for a re-entered round type can't be mistaken for payloads of an earlier
/// instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct RoundCount(u64);

impl RoundCount {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for RoundCount {
    type Output = RoundCount;
    fn add(self, rhs: u64) -> Self::Output {
        RoundCount(self.0 + rhs)
    }
}

impl Display for RoundCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Consensus-agreed time, in milliseconds since the Unix Epoch.
///
/// Round timeouts are measured against timestamps agreed upon by the consensus layer (e.g., block
/// header times) rather than local clocks, so that every replica synthesises a timeout event at the
/// same point in the sequence of inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(&self, duration: std::time::Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

/// SHA-256 hash of a value, e.g., of a [SynchronizedData](crate::synchronized_data::SynchronizedData)'s
/// serialized form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bytes of an Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes(..)")
    }
}

/// Maximum number of payloads for future round instances that a replica buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSize(usize);

impl BufferSize {
    pub const fn new(int: usize) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> usize {
        self.0
    }
}

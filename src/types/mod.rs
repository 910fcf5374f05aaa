/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of the round engine.
//!
//! Other types, specific to single components, live next to those components, e.g.,
//! [`crate::synchronized_data::DataUpdates`].

pub mod basic;

pub mod crypto_primitives;

pub mod participants;

pub mod payload;

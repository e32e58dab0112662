//! Integration test suite for Sigil.
//!
//! Drives the wallet crates together through their public API: known
//! derivation vectors, account lifecycle flows against an in-memory store,
//! and property tests over the codec and derivation.

pub mod helpers;

//! # sigil-core
//! Foundation types and traits for the Sigil wallet.

pub mod amount;
pub mod constants;
pub mod error;
pub mod network;
pub mod traits;
pub mod types;

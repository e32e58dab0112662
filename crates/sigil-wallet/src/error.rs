//! Wallet error types.

use sigil_core::error::{AddressError, AmountError, FetchError, NetworkError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Wrong password, or the ciphertext failed authentication.
    #[error("decryption failed: wrong password or corrupted data")]
    Decryption,

    /// Encrypted data is structurally malformed (bad encoding, truncated, unknown version).
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// BIP-32 derivation failure or malformed extended key.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Payment key is neither WIF nor raw hex.
    #[error("invalid payment key: {0}")]
    InvalidPaymentKey(String),

    /// Invalid address string.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Payment address cannot fund a spend.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available balance in satoshis.
        have: u64,
        /// Required amount in satoshis.
        need: u64,
    },

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Spend construction or signing failed.
    #[error("transaction build: {0}")]
    TransactionBuild(String),

    /// The network refused or failed to relay a transaction.
    #[error("broadcast: {0}")]
    Broadcast(String),

    /// Account record or response (de)serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}

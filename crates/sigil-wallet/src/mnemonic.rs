//! BIP-39 backup phrase generation, validation and seed stretching.

use bip39::{Language, Mnemonic};

use crate::error::WalletError;
use crate::keys::Seed;

/// Entropy of a freshly generated phrase (24 words).
const NEW_PHRASE_ENTROPY_BYTES: usize = 32;

/// Generate a new 24-word English backup phrase from the OS RNG.
pub fn generate_mnemonic() -> Result<Mnemonic, WalletError> {
    use rand::RngCore;
    let mut entropy = zeroize::Zeroizing::new([0u8; NEW_PHRASE_ENTROPY_BYTES]);
    rand::rngs::OsRng.fill_bytes(entropy.as_mut_slice());
    Mnemonic::from_entropy_in(Language::English, entropy.as_slice())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Collapse runs of whitespace and lowercase the phrase.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse and checksum-validate a backup phrase of any standard length.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = normalize_phrase(phrase);
    Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Stretch a backup phrase into the 64-byte BIP-39 seed (empty passphrase).
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, WalletError> {
    let m = parse_mnemonic(phrase)?;
    Ok(Seed::from_bytes(m.to_seed_normalized("")))
}

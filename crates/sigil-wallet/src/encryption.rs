//! Password-based AES-256-GCM encryption of the backup phrase.
//!
//! Keys are stretched from the password with Argon2id. The cost parameters
//! travel in the header so a blob stays decryptable after the defaults move.
//!
//! # Wire format
//! ```text
//! version (1) || m_cost (4, LE) || t_cost (4, LE) || p_cost (4, LE)
//!   || salt (16) || nonce (12) || ciphertext + auth_tag
//! ```
//!
//! The byte blob is carried as text using an explicit [`Encoding`]: hex for
//! blobs produced inside the wallet, base64 for blobs passed through URLs.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::WalletError;

/// Current wire format version.
pub const FORMAT_VERSION: u8 = 1;

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// version + three u32 cost parameters + salt + nonce.
const HEADER_LEN: usize = 1 + 12 + SALT_LEN + NONCE_LEN;

/// Minimum encrypted payload size (header + auth tag).
const MIN_ENCRYPTED_LEN: usize = HEADER_LEN + TAG_LEN;

/// Upper bound on the memory cost accepted from a header (256 MiB).
const MAX_MEMORY_KIB: u32 = 1 << 18;

/// Upper bound on Argon2 passes accepted from a header.
const MAX_ITERATIONS: u32 = 16;

/// Upper bound on Argon2 lanes accepted from a header.
const MAX_PARALLELISM: u32 = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Light preset for tests and constrained devices (1 MiB, 1 pass).
    pub fn interactive() -> Self {
        Self {
            memory_kib: 1_024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Text encoding of an encrypted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Hex,
    Base64,
}

impl Encoding {
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Hex => hex::encode(bytes),
            Encoding::Base64 => BASE64.encode(bytes),
        }
    }

    pub fn decode(self, text: &str) -> Result<Vec<u8>, WalletError> {
        let text = text.trim();
        match self {
            Encoding::Hex => hex::decode(text)
                .map_err(|e| WalletError::CorruptedData(format!("invalid hex: {e}"))),
            Encoding::Base64 => BASE64
                .decode(text)
                .map_err(|e| WalletError::CorruptedData(format!("invalid base64: {e}"))),
        }
    }
}

/// Derive a 256-bit encryption key from a password and salt using Argon2id.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Reject cost parameters outside the range this codec will run.
///
/// Every cost must be at least 1 and at most its cap, so a damaged header
/// fails fast instead of starting an unbounded key derivation.
fn check_cost_bounds(params: &KdfParams) -> Result<(), String> {
    let fields = [
        ("memory cost", params.memory_kib, MAX_MEMORY_KIB),
        ("iterations", params.iterations, MAX_ITERATIONS),
        ("parallelism", params.parallelism, MAX_PARALLELISM),
    ];
    for (name, value, max) in fields {
        if !(1..=max).contains(&value) {
            return Err(format!("{name} {value} outside 1..={max}"));
        }
    }
    Ok(())
}

/// Encrypt plaintext with a password using AES-256-GCM.
///
/// Generates a random 16-byte salt and 12-byte nonce per call, so encrypting
/// the same plaintext twice yields different blobs.
pub fn encrypt(plaintext: &[u8], password: &str, params: &KdfParams) -> Result<Vec<u8>, WalletError> {
    use rand::RngCore;
    check_cost_bounds(params).map_err(WalletError::Encryption)?;

    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password.as_bytes(), &salt, params)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&params.memory_kib.to_le_bytes());
    result.extend_from_slice(&params.iterations.to_le_bytes());
    result.extend_from_slice(&params.parallelism.to_le_bytes());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data that was encrypted with [`encrypt`].
///
/// Returns [`WalletError::Decryption`] when the password is wrong or any
/// authenticated byte was altered, and [`WalletError::CorruptedData`] when
/// the blob cannot be parsed at all.
pub fn decrypt(encrypted: &[u8], password: &str) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(WalletError::CorruptedData(format!(
            "encrypted data too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }
    if encrypted[0] != FORMAT_VERSION {
        return Err(WalletError::CorruptedData(format!(
            "unknown format version {}",
            encrypted[0]
        )));
    }

    let params = KdfParams {
        memory_kib: read_u32(&encrypted[1..5]),
        iterations: read_u32(&encrypted[5..9]),
        parallelism: read_u32(&encrypted[9..13]),
    };
    check_cost_bounds(&params).map_err(WalletError::CorruptedData)?;

    let salt = &encrypted[13..13 + SALT_LEN];
    let nonce_bytes = &encrypted[13 + SALT_LEN..HEADER_LEN];
    let ciphertext = &encrypted[HEADER_LEN..];

    // Tampered cost fields either fail here or produce the wrong key below.
    let key = derive_key(password.as_bytes(), salt, &params).map_err(|_| WalletError::Decryption)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| WalletError::Decryption)
}

/// [`encrypt`] and render the blob as text.
pub fn encrypt_encoded(
    plaintext: &[u8],
    password: &str,
    params: &KdfParams,
    encoding: Encoding,
) -> Result<String, WalletError> {
    encrypt(plaintext, password, params).map(|blob| encoding.encode(&blob))
}

/// Decode a text blob and [`decrypt`] it.
pub fn decrypt_encoded(
    encoded: &str,
    password: &str,
    encoding: Encoding,
) -> Result<Vec<u8>, WalletError> {
    let blob = encoding.decode(encoded)?;
    decrypt(&blob, password)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

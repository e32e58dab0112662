//! Seed management and the two BIP-32 key hierarchies.
//!
//! One master node feeds two independent keychains:
//!
//! ```text
//! m/44'/0'/0'          bitcoin keychain   receive address i = /0/i
//! m/888'/0'            identity keychain  owner node i      = /i'
//!                                         apps node         = /i'/0'
//! ```
//!
//! Bitcoin receive addresses are non-hardened, so they can be extended from
//! the published xpub alone. Identity owner nodes are hardened and need the
//! private identity keychain.
//!
//! Everything here is a pure function of the seed. Deriving twice from the
//! same phrase yields byte-identical keychains, addresses and keypairs.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Network, PrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use sigil_core::constants::{
    APPS_NODE_INDEX, BIP44_PURPOSE, BITCOIN_ACCOUNT_INDEX, BITCOIN_COIN_TYPE,
    BLOCKSTACK_ON_BITCOIN, EXTERNAL_ADDRESS_CHAIN, IDENTITY_KEYCHAIN,
};

use crate::error::WalletError;
use crate::mnemonic;

/// A 64-byte BIP-39 seed.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 64],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Keys for one identity: the owner key, its address and the app-storage node.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IdentityKeypair {
    /// Owner private key, 32 bytes hex.
    pub key: String,
    /// Compressed owner public key, hex.
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// P2PKH address of the owner key.
    pub address: String,
    /// Extended private key of the apps node below the owner node.
    #[serde(rename = "appsNodeKey")]
    pub apps_node_key: String,
    /// Hex SHA-256 of the identity keychain's public key hex.
    pub salt: String,
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("key", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("address", &self.address)
            .field("apps_node_key", &"[REDACTED]")
            .field("salt", &self.salt)
            .finish()
    }
}

/// Everything derived when an account is created or restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAccount {
    pub identity_public_keychain: String,
    pub bitcoin_public_keychain: String,
    pub first_bitcoin_address: String,
    pub identity_addresses: Vec<String>,
    pub identity_keypairs: Vec<IdentityKeypair>,
}

/// The backup phrase an account was derived from, alongside the derivation.
pub struct NewAccount {
    /// Normalized phrase. Zeroized on drop.
    pub phrase: Zeroizing<String>,
    pub account: DerivedAccount,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("phrase", &"[REDACTED]")
            .field("account", &self.account)
            .finish()
    }
}

/// BIP-32 master node with helpers for both key hierarchies.
pub struct MasterKeychain {
    root: Xpriv,
    secp: Secp256k1<All>,
}

impl MasterKeychain {
    /// Master node from a 64-byte seed.
    pub fn from_seed(seed: &Seed) -> Result<Self, WalletError> {
        let root = Xpriv::new_master(Network::Bitcoin, seed.as_bytes())
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        Ok(Self {
            root,
            secp: Secp256k1::new(),
        })
    }

    /// Master node from a backup phrase.
    pub fn from_phrase(phrase: &str) -> Result<Self, WalletError> {
        let seed = mnemonic::mnemonic_to_seed(phrase)?;
        Self::from_seed(&seed)
    }

    /// Private bitcoin keychain, `m/44'/0'/0'`.
    pub fn bitcoin_keychain(&self) -> Result<Xpriv, WalletError> {
        self.derive(&[
            hardened(BIP44_PURPOSE)?,
            hardened(BITCOIN_COIN_TYPE)?,
            hardened(BITCOIN_ACCOUNT_INDEX)?,
        ])
    }

    /// Private identity keychain, `m/888'/0'`.
    pub fn identity_keychain(&self) -> Result<Xpriv, WalletError> {
        self.derive(&[hardened(IDENTITY_KEYCHAIN)?, hardened(BLOCKSTACK_ON_BITCOIN)?])
    }

    pub fn bitcoin_public_keychain(&self) -> Result<Xpub, WalletError> {
        Ok(Xpub::from_priv(&self.secp, &self.bitcoin_keychain()?))
    }

    pub fn identity_public_keychain(&self) -> Result<Xpub, WalletError> {
        Ok(Xpub::from_priv(&self.secp, &self.identity_keychain()?))
    }

    /// P2PKH receive address `index` of the bitcoin keychain.
    pub fn bitcoin_address(&self, index: u32) -> Result<String, WalletError> {
        let node = self.payment_node(index)?;
        Ok(p2pkh(&self.secp, &node))
    }

    /// Private key controlling receive address `index`.
    pub fn payment_key(&self, index: u32) -> Result<PrivateKey, WalletError> {
        Ok(self.payment_node(index)?.to_priv())
    }

    /// Identity keypair `index`. Extends the hierarchy without touching
    /// lower indexes.
    pub fn identity_keypair(&self, index: u32) -> Result<IdentityKeypair, WalletError> {
        let identity = self.identity_keychain()?;
        let salt = identity_salt(&self.secp, &identity);
        let owner = identity
            .derive_priv(&self.secp, &[hardened(index)?])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let apps = owner
            .derive_priv(&self.secp, &[hardened(APPS_NODE_INDEX)?])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let public_key = owner.private_key.public_key(&self.secp);

        Ok(IdentityKeypair {
            key: hex::encode(owner.private_key.secret_bytes()),
            key_id: hex::encode(public_key.serialize()),
            address: p2pkh(&self.secp, &owner),
            apps_node_key: apps.to_string(),
            salt,
        })
    }

    /// Both public keychains, the first receive address and `count` identities.
    pub fn derive_account(&self, count: u32) -> Result<DerivedAccount, WalletError> {
        let identity_keypairs = (0..count)
            .map(|i| self.identity_keypair(i))
            .collect::<Result<Vec<_>, _>>()?;
        let identity_addresses = identity_keypairs.iter().map(|k| k.address.clone()).collect();

        Ok(DerivedAccount {
            identity_public_keychain: self.identity_public_keychain()?.to_string(),
            bitcoin_public_keychain: self.bitcoin_public_keychain()?.to_string(),
            first_bitcoin_address: self.bitcoin_address(0)?,
            identity_addresses,
            identity_keypairs,
        })
    }

    fn payment_node(&self, index: u32) -> Result<Xpriv, WalletError> {
        self.derive(&[
            hardened(BIP44_PURPOSE)?,
            hardened(BITCOIN_COIN_TYPE)?,
            hardened(BITCOIN_ACCOUNT_INDEX)?,
            normal(EXTERNAL_ADDRESS_CHAIN)?,
            normal(index)?,
        ])
    }

    fn derive(&self, path: &[ChildNumber]) -> Result<Xpriv, WalletError> {
        let path = DerivationPath::from(path.to_vec());
        self.root
            .derive_priv(&self.secp, &path)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))
    }
}

impl fmt::Debug for MasterKeychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeychain")
            .field("root", &"[REDACTED]")
            .finish()
    }
}

/// Derive an account from a backup phrase, or from a fresh 24-word phrase
/// when none is given. Both paths run the same derivation.
pub fn derive_account(phrase: Option<&str>, count: u32) -> Result<NewAccount, WalletError> {
    let mnemonic = match phrase {
        Some(p) => mnemonic::parse_mnemonic(p)?,
        None => mnemonic::generate_mnemonic()?,
    };
    let phrase = Zeroizing::new(mnemonic.to_string());
    let master = MasterKeychain::from_phrase(&phrase)?;
    let account = master.derive_account(count)?;
    Ok(NewAccount { phrase, account })
}

/// Receive address `index` computed from a published bitcoin xpub.
pub fn bitcoin_address_at(bitcoin_public_keychain: &str, index: u32) -> Result<String, WalletError> {
    let secp = Secp256k1::verification_only();
    let xpub = Xpub::from_str(bitcoin_public_keychain)
        .map_err(|e| WalletError::KeyDerivation(format!("invalid xpub: {e}")))?;
    let child = xpub
        .derive_pub(&secp, &[normal(EXTERNAL_ADDRESS_CHAIN)?, normal(index)?])
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
    Ok(Address::p2pkh(child.to_pub(), Network::Bitcoin).to_string())
}

fn identity_salt(secp: &Secp256k1<All>, identity: &Xpriv) -> String {
    let public_hex = hex::encode(identity.private_key.public_key(secp).serialize());
    hex::encode(Sha256::digest(public_hex.as_bytes()))
}

fn p2pkh(secp: &Secp256k1<All>, node: &Xpriv) -> String {
    let public = Xpub::from_priv(secp, node).to_pub();
    Address::p2pkh(public, Network::Bitcoin).to_string()
}

fn hardened(index: u32) -> Result<ChildNumber, WalletError> {
    ChildNumber::from_hardened_idx(index).map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

fn normal(index: u32) -> Result<ChildNumber, WalletError> {
    ChildNumber::from_normal_idx(index).map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

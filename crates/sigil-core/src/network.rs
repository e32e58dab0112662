//! Network presets and address coercion.
//!
//! A [`NetworkSettings`] value is passed explicitly to every component that
//! builds, signs or broadcasts transactions. Switching to the local regtest
//! chain means handing over a different settings value, never mutating a
//! shared one.

use bitcoin::base58;
use serde::{Deserialize, Serialize};

use crate::constants::{
    LOCAL_REGTEST_API_URL, LOCAL_REGTEST_BITCOIND_URL, MAINNET_P2PKH_VERSION,
    MAINNET_P2SH_VERSION, TESTNET_P2PKH_VERSION, TESTNET_P2SH_VERSION,
};
use crate::error::AddressError;

/// Which chain a [`NetworkSettings`] targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Bitcoin mainnet.
    Mainnet,
    /// A local regression-test chain behind a Core API node.
    LocalRegtest,
}

/// Explicit network configuration handed to the transaction pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Chain selector.
    pub kind: NetworkKind,
    /// Base URL of the Core API node serving this network.
    pub api_url: String,
    /// bitcoind JSON-RPC endpoint, when the network is driven through one.
    pub bitcoind_url: Option<String>,
}

impl NetworkSettings {
    /// Mainnet preset backed by the given Core API URL.
    pub fn mainnet(api_url: impl Into<String>) -> Self {
        Self {
            kind: NetworkKind::Mainnet,
            api_url: api_url.into(),
            bitcoind_url: None,
        }
    }

    /// Local regtest preset: Core API on port 6270, bitcoind on 18332.
    pub fn local_regtest() -> Self {
        Self {
            kind: NetworkKind::LocalRegtest,
            api_url: LOCAL_REGTEST_API_URL.to_string(),
            bitcoind_url: Some(LOCAL_REGTEST_BITCOIND_URL.to_string()),
        }
    }

    /// The `bitcoin` crate network used for address validation and keys.
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self.kind {
            NetworkKind::Mainnet => bitcoin::Network::Bitcoin,
            NetworkKind::LocalRegtest => bitcoin::Network::Regtest,
        }
    }

    /// Whether this is the local regtest chain.
    pub fn is_regtest(&self) -> bool {
        self.kind == NetworkKind::LocalRegtest
    }

    /// Re-encode a base58 address for this network.
    ///
    /// Mainnet returns the address unchanged. Regtest swaps the version byte
    /// to its testnet counterpart so mainnet-formatted recipients can be
    /// paid on the local chain.
    pub fn coerce_address(&self, address: &str) -> Result<String, AddressError> {
        match self.kind {
            NetworkKind::Mainnet => Ok(address.to_string()),
            NetworkKind::LocalRegtest => coerce_to_testnet(address),
        }
    }
}

/// Swap a base58check address's version byte to the testnet equivalent.
pub fn coerce_to_testnet(address: &str) -> Result<String, AddressError> {
    let mut payload = base58::decode_check(address)
        .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
    let Some(version) = payload.first().copied() else {
        return Err(AddressError::InvalidBase58("empty payload".into()));
    };
    payload[0] = match version {
        MAINNET_P2PKH_VERSION | TESTNET_P2PKH_VERSION => TESTNET_P2PKH_VERSION,
        MAINNET_P2SH_VERSION | TESTNET_P2SH_VERSION => TESTNET_P2SH_VERSION,
        other => return Err(AddressError::UnsupportedVersion(other)),
    };
    Ok(base58::encode_check(&payload))
}

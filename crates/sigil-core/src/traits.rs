//! Trait interfaces between the wallet core and the outside world.
//!
//! - [`HttpClient`]: request/response HTTP capability (sigil-net implements it)
//! - [`BitcoinNetwork`]: UTXO lookup, fee estimation and broadcast for one chain
//! - [`EndpointPolicy`]: deployment switch that disables Core API endpoints
//!
//! Every operation that touches the network receives these as parameters, so
//! a regtest chain or a test double is substituted by passing a different
//! value rather than rewiring shared state.

use async_trait::async_trait;

use crate::error::{FetchError, NetworkError};
use crate::network::NetworkSettings;
use crate::types::{HttpRequest, Utxo};

/// Sends an HTTP request and returns the response body as text.
///
/// Non-2xx responses are reported as [`FetchError::Status`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<String, FetchError>;
}

/// Chain access needed to fund, price and publish a spend.
#[async_trait]
pub trait BitcoinNetwork: Send + Sync {
    /// The configuration this network was built from.
    fn settings(&self) -> &NetworkSettings;

    /// Unspent outputs paying to `address`.
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, NetworkError>;

    /// Current fee rate in satoshis per byte.
    async fn get_fee_rate(&self) -> Result<u64, NetworkError>;

    /// Publish a signed transaction. Returns the node's confirmation (usually the txid).
    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, NetworkError>;
}

/// Decides whether a Core API endpoint is administratively disabled.
///
/// A disabled endpoint is never contacted; the calling operation produces
/// its fixed placeholder result instead.
pub trait EndpointPolicy: Send + Sync {
    fn is_disabled(&self, url: &str) -> bool;
}

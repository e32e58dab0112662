//! # sigil-net
//! Network backends for the Sigil wallet.
//!
//! - [`http`]: `reqwest` implementation of `HttpClient`
//! - [`esplora`]: Esplora REST chain access (mainnet)
//! - [`bitcoind`]: bitcoind JSON-RPC chain access (local regtest)

pub mod bitcoind;
pub mod esplora;
pub mod http;

pub use bitcoind::BitcoindNetwork;
pub use esplora::EsploraNetwork;
pub use http::ReqwestClient;

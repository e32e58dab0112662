//! bitcoind JSON-RPC backend, used for the local regtest chain.

use async_trait::async_trait;
use base64::Engine as _;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use sigil_core::amount::btc_to_satoshis;
use sigil_core::constants::{LOCAL_REGTEST_BITCOIND_PASSWORD, LOCAL_REGTEST_BITCOIND_URL, LOCAL_REGTEST_BITCOIND_USER};
use sigil_core::error::NetworkError;
use sigil_core::network::NetworkSettings;
use sigil_core::traits::BitcoinNetwork;
use sigil_core::types::Utxo;

/// Upper bound on confirmations passed to `listunspent`.
const MAX_CONFIRMATIONS: u32 = 9_999_999;

/// Blocks targeted by `estimatesmartfee`.
const FEE_TARGET_BLOCKS: u32 = 6;

#[derive(Deserialize)]
struct UnspentEntry {
    txid: String,
    vout: u32,
    /// BTC.
    amount: f64,
    confirmations: u64,
}

#[derive(Deserialize)]
struct SmartFee {
    /// BTC per kvB. Absent when the node has no estimate yet.
    feerate: Option<f64>,
}

/// Value of an HTTP Basic `Authorization` header.
pub fn basic_auth(user: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {token}")
}

/// Convert a BTC/kvB fee rate to whole sat/byte, at least 1.
pub fn btc_per_kvb_to_sat_per_byte(feerate: f64) -> Option<u64> {
    let sat_per_kvb = btc_to_satoshis(feerate).ok()?;
    Some(sat_per_kvb.div_ceil(1000).max(1))
}

pub struct BitcoindNetwork {
    client: HttpClient,
    settings: NetworkSettings,
}

impl BitcoindNetwork {
    pub fn new(url: &str, user: &str, password: &str, settings: NetworkSettings) -> Result<Self, NetworkError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&basic_auth(user, password))
            .map_err(|e| NetworkError::Utxos(format!("invalid rpc credentials: {e}")))?;
        headers.insert("Authorization", auth);
        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .build(url)
            .map_err(|e| NetworkError::Utxos(format!("building rpc client for {url}: {e}")))?;
        Ok(Self { client, settings })
    }

    /// The stock local regtest node.
    pub fn local_regtest() -> Result<Self, NetworkError> {
        Self::new(
            LOCAL_REGTEST_BITCOIND_URL,
            LOCAL_REGTEST_BITCOIND_USER,
            LOCAL_REGTEST_BITCOIND_PASSWORD,
            NetworkSettings::local_regtest(),
        )
    }
}

fn params(values: impl IntoIterator<Item = Value>) -> Result<ArrayParams, String> {
    let mut params = ArrayParams::new();
    for value in values {
        params.insert(value).map_err(|e| e.to_string())?;
    }
    Ok(params)
}

#[async_trait]
impl BitcoinNetwork for BitcoindNetwork {
    fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, NetworkError> {
        let args = params([
            Value::from(0),
            Value::from(MAX_CONFIRMATIONS),
            Value::from(vec![address.to_string()]),
        ])
        .map_err(NetworkError::Utxos)?;
        let entries: Vec<UnspentEntry> = self
            .client
            .request("listunspent", args)
            .await
            .map_err(|e| NetworkError::Utxos(e.to_string()))?;
        debug!(address, count = entries.len(), "listunspent");

        entries
            .into_iter()
            .map(|e| {
                let value = btc_to_satoshis(e.amount).map_err(|err| NetworkError::Utxos(err.to_string()))?;
                Ok(Utxo {
                    txid: e.txid,
                    vout: e.vout,
                    value,
                    confirmed: e.confirmations > 0,
                })
            })
            .collect()
    }

    async fn get_fee_rate(&self) -> Result<u64, NetworkError> {
        let args = params([Value::from(FEE_TARGET_BLOCKS)]).map_err(NetworkError::FeeRate)?;
        let fee: SmartFee = self
            .client
            .request("estimatesmartfee", args)
            .await
            .map_err(|e| NetworkError::FeeRate(e.to_string()))?;
        fee.feerate
            .and_then(btc_per_kvb_to_sat_per_byte)
            .ok_or_else(|| NetworkError::FeeRate("node has no fee estimate".into()))
    }

    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, NetworkError> {
        let args = params([Value::from(tx_hex)]).map_err(NetworkError::Broadcast)?;
        self.client
            .request::<String, _>("sendrawtransaction", args)
            .await
            .map_err(|e| NetworkError::Broadcast(e.to_string()))
    }
}

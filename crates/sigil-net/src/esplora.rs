//! Esplora REST backend for [`BitcoinNetwork`].
//!
//! Endpoints used:
//! - `GET  {base}/address/{address}/utxo`
//! - `GET  {base}/fee-estimates`
//! - `POST {base}/tx` with the raw hex as the body

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use sigil_core::error::NetworkError;
use sigil_core::network::NetworkSettings;
use sigil_core::traits::{BitcoinNetwork, HttpClient};
use sigil_core::types::{HttpRequest, Utxo};

/// Confirmation target, in blocks, used to pick a fee estimate.
pub const DEFAULT_CONFIRMATION_TARGET: u32 = 6;

#[derive(Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Deserialize)]
struct EsploraStatus {
    confirmed: bool,
}

pub struct EsploraNetwork {
    http: Arc<dyn HttpClient>,
    base_url: String,
    settings: NetworkSettings,
    confirmation_target: u32,
}

impl EsploraNetwork {
    pub fn new(http: Arc<dyn HttpClient>, base_url: &str, settings: NetworkSettings) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
            confirmation_target: DEFAULT_CONFIRMATION_TARGET,
        }
    }

    pub fn with_confirmation_target(mut self, blocks: u32) -> Self {
        self.confirmation_target = blocks;
        self
    }
}

/// Pick the estimate for `target` blocks, or the closest slower one, as whole sat/byte.
fn fee_for_target(estimates: &HashMap<String, f64>, target: u32) -> Option<u64> {
    let mut by_target: Vec<(u32, f64)> = estimates
        .iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|blocks| (blocks, *v)))
        .collect();
    by_target.sort_by_key(|(blocks, _)| *blocks);
    let rate = by_target
        .iter()
        .find(|(blocks, _)| *blocks >= target)
        .or_else(|| by_target.last())
        .map(|(_, rate)| *rate)?;
    Some((rate.ceil() as u64).max(1))
}

#[async_trait]
impl BitcoinNetwork for EsploraNetwork {
    fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, NetworkError> {
        let url = format!("{}/address/{address}/utxo", self.base_url);
        let body = self.http.send(HttpRequest::get(url)).await?;
        let raw: Vec<EsploraUtxo> =
            serde_json::from_str(&body).map_err(|e| NetworkError::Utxos(e.to_string()))?;
        debug!(address, count = raw.len(), "fetched utxos");
        Ok(raw
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
                confirmed: u.status.confirmed,
            })
            .collect())
    }

    async fn get_fee_rate(&self) -> Result<u64, NetworkError> {
        let url = format!("{}/fee-estimates", self.base_url);
        let body = self.http.send(HttpRequest::get(url)).await?;
        let estimates: HashMap<String, f64> =
            serde_json::from_str(&body).map_err(|e| NetworkError::FeeRate(e.to_string()))?;
        fee_for_target(&estimates, self.confirmation_target)
            .ok_or_else(|| NetworkError::FeeRate("no fee estimates returned".into()))
    }

    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, NetworkError> {
        let url = format!("{}/tx", self.base_url);
        let body = self
            .http
            .send(HttpRequest::post_text(url, tx_hex))
            .await
            .map_err(|e| NetworkError::Broadcast(e.to_string()))?;
        Ok(body.trim().to_string())
    }
}

//! Shared test doubles and fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sigil_core::error::{FetchError, NetworkError};
use sigil_core::network::NetworkSettings;
use sigil_core::traits::{BitcoinNetwork, HttpClient};
use sigil_core::types::{HttpRequest, Utxo};
use sigil_wallet::{AccountActions, AccountStore, CoreEndpointPolicy, KdfParams, ServiceUrls};

/// 24-word phrase with published derivation vectors.
pub const PHRASE: &str = "sound idle panel often situate develop unit text design antenna vendor screen opinion balcony share trigger accuse scatter visa uniform brass update opinion media";

pub const BITCOIN_XPUB: &str = "xpub6Br2scNTh9Luk2VPebfEvjbWWC5WhvxpxgK8ap2qhYTS4xvZu8Y3G1npmx8DdvwUdCbtNb7qNLyTChKMbY8dThLV5Zvdq9AojQjxrM6gTC8";
pub const IDENTITY_XPUB: &str = "xpub6B6tCCb8T5eXUKVYUoppmSi5KhNRboRJUwqHavxdvQTncfmBNFCX4Nq9w8DsfuS6AYPpBYRuS3dcUuyF8mQtwEydAEN3A4Cx6HDy58jpKEb";
pub const BITCOIN_ADDRESS_0: &str = "112FogMTesWmLzkWbtKrSg3p9LK6Lucn4s";
pub const BITCOIN_ADDRESS_1: &str = "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW";
pub const IDENTITY_ADDRESS_0: &str = "1JeTQ5cQjsD57YGcsVFhwT7iuQUXJR6BSk";
pub const IDENTITY_ADDRESS_1: &str = "14jdV3dEQ7TmEaZePaLmKgMDg9Y48UFTL3";
pub const IDENTITY_KEY_0: &str = "a29c3e73dba79ab0f84cb792bafd65ec71f243ebe67a7ebd842ef5cdce3b21eb";
/// WIF of the payment key for bitcoin address 0.
pub const PAYMENT_WIF_0: &str = "L5HA8txJqKzQAbj2LCG9uTPkTHYdt6fHVsL3TYac5hQsi2BCFstp";

pub const CORE_API: &str = "http://localhost:6270";
pub const BALANCE_URL: &str = "https://balances.test/q/addressbalance/";
pub const EMAILER_URL: &str = "https://emailer.test/notifications";

/// HTTP double that answers by exact URL and records every request.
#[derive(Default)]
pub struct MockHttp {
    replies: Mutex<Vec<(String, Result<String, FetchError>)>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `body`.
    pub fn ok(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.replies.lock().push((url.into(), Ok(body.into())));
        self
    }

    /// Answer `url` with an HTTP status error.
    pub fn status(self, url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        let err = FetchError::Status {
            url: url.clone(),
            status,
        };
        self.replies.lock().push((url, Err(err)));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.seen.lock().iter().filter(|r| r.url == url).cloned().collect()
    }
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn send(&self, request: HttpRequest) -> Result<String, FetchError> {
        self.seen.lock().push(request.clone());
        let reply = self
            .replies
            .lock()
            .iter()
            .find(|(url, _)| *url == request.url)
            .map(|(_, reply)| reply.clone());
        reply.unwrap_or(Err(FetchError::Request {
            url: request.url,
            message: "connection refused".into(),
        }))
    }
}

/// Chain double with a fixed UTXO set and fee rate.
pub struct MockChain {
    settings: NetworkSettings,
    pub utxos: Vec<Utxo>,
    pub fee_rate: Result<u64, NetworkError>,
    pub broadcast_reply: Result<String, NetworkError>,
    broadcasts: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            settings,
            utxos: Vec::new(),
            fee_rate: Ok(1),
            broadcast_reply: Ok("confirmed".into()),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn mainnet() -> Self {
        Self::new(NetworkSettings::mainnet(CORE_API))
    }

    pub fn regtest() -> Self {
        Self::new(NetworkSettings::local_regtest())
    }

    /// Add a confirmed UTXO of `value` satoshis.
    pub fn with_utxo(mut self, value: u64) -> Self {
        let n = self.utxos.len() as u8 + 1;
        self.utxos.push(Utxo {
            txid: hex_byte(n).repeat(32),
            vout: 0,
            value,
            confirmed: true,
        });
        self
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().clone()
    }
}

fn hex_byte(n: u8) -> String {
    format!("{n:02x}")
}

#[async_trait]
impl BitcoinNetwork for MockChain {
    fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    async fn get_utxos(&self, _address: &str) -> Result<Vec<Utxo>, NetworkError> {
        Ok(self.utxos.clone())
    }

    async fn get_fee_rate(&self) -> Result<u64, NetworkError> {
        self.fee_rate.clone()
    }

    async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, NetworkError> {
        self.broadcasts.lock().push(tx_hex.to_string());
        self.broadcast_reply.clone()
    }
}

/// A store wired to account actions over mock transports.
pub struct TestWallet {
    pub store: Arc<AccountStore>,
    pub http: Arc<MockHttp>,
    pub chain: Arc<MockChain>,
    pub regtest: Arc<MockChain>,
    pub actions: AccountActions,
}

impl TestWallet {
    /// Native build: Core API endpoints are enabled.
    pub fn new(http: MockHttp, chain: MockChain, regtest: MockChain) -> Self {
        Self::with_policy(http, chain, regtest, CoreEndpointPolicy::new(false, CORE_API))
    }

    /// Web-app build: Core API endpoints are disabled.
    pub fn webapp(http: MockHttp) -> Self {
        Self::with_policy(
            http,
            MockChain::mainnet(),
            MockChain::regtest(),
            CoreEndpointPolicy::new(true, CORE_API),
        )
    }

    fn with_policy(http: MockHttp, chain: MockChain, regtest: MockChain, policy: CoreEndpointPolicy) -> Self {
        let store = Arc::new(AccountStore::new());
        let http = Arc::new(http);
        let chain = Arc::new(chain);
        let regtest = Arc::new(regtest);
        let urls = ServiceUrls {
            balance_url: BALANCE_URL.to_string(),
            emailer_url: EMAILER_URL.to_string(),
            ..ServiceUrls::for_core_api(CORE_API)
        };
        let actions = AccountActions::new(http.clone(), chain.clone(), store.clone())
            .with_regtest_network(regtest.clone())
            .with_policy(Arc::new(policy))
            .with_urls(urls)
            .with_kdf_params(KdfParams::interactive());
        Self {
            store,
            http,
            chain,
            regtest,
            actions,
        }
    }

    pub fn urls(&self) -> &ServiceUrls {
        self.actions.urls()
    }
}

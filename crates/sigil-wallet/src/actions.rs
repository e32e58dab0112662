//! Asynchronous account operations.
//!
//! [`AccountActions`] owns the injected capabilities (HTTP, chain access,
//! endpoint policy and a [`Dispatcher`]) and exposes each operation as a
//! method that dispatches its progress and outcome as [`AccountAction`]s.
//!
//! Operations follow one pattern: dispatch any "in progress" action
//! immediately, do the network or cryptographic work, then dispatch exactly
//! one settling action. Best-effort refreshes that fail dispatch nothing and
//! log a warning instead.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use sigil_core::amount::{btc_to_satoshis, satoshis_to_btc};
use sigil_core::error::FetchError;
use sigil_core::traits::{BitcoinNetwork, EndpointPolicy, HttpClient};
use sigil_core::types::HttpRequest;

use crate::account::{self, AccountAction, Balances};
use crate::builder::{PaymentKey, TransactionBuilder};
use crate::core_api::{authorization_header_value, CoreEndpointPolicy, ServiceUrls};
use crate::encryption::{decrypt_encoded, encrypt_encoded, Encoding, KdfParams};
use crate::error::WalletError;
use crate::keys::{self, MasterKeychain};
use crate::store::Dispatcher;

/// Refusal reported when withdrawals are attempted against a disabled Core API.
pub const WITHDRAWALS_DISABLED_MESSAGE: &str = "Core wallet withdrawals not allowed in the simple webapp build";

/// Number of identities derived by [`AccountActions::initialize_wallet`].
const INITIAL_IDENTITIES: u32 = 1;

/// Decrypt an encrypted backup phrase back to its words.
pub fn decrypt_backup_phrase(
    encrypted: &str,
    password: &str,
    encoding: Encoding,
) -> Result<Zeroizing<String>, WalletError> {
    let plaintext = Zeroizing::new(decrypt_encoded(encrypted, password, encoding)?);
    let phrase = std::str::from_utf8(&plaintext)
        .map_err(|_| WalletError::CorruptedData("backup phrase is not UTF-8".into()))?;
    Ok(Zeroizing::new(phrase.to_string()))
}

/// The account operations, wired to their collaborators.
pub struct AccountActions {
    http: Arc<dyn HttpClient>,
    network: Arc<dyn BitcoinNetwork>,
    regtest: Option<Arc<dyn BitcoinNetwork>>,
    policy: Arc<dyn EndpointPolicy>,
    urls: ServiceUrls,
    kdf: KdfParams,
    dispatcher: Arc<dyn Dispatcher>,
}

impl AccountActions {
    pub fn new(
        http: Arc<dyn HttpClient>,
        network: Arc<dyn BitcoinNetwork>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            http,
            network,
            regtest: None,
            policy: Arc::new(CoreEndpointPolicy::default()),
            urls: ServiceUrls::default(),
            kdf: KdfParams::default(),
            dispatcher,
        }
    }

    /// Network used when an operation asks for regtest mode.
    pub fn with_regtest_network(mut self, regtest: Arc<dyn BitcoinNetwork>) -> Self {
        self.regtest = Some(regtest);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn EndpointPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_urls(mut self, urls: ServiceUrls) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn urls(&self) -> &ServiceUrls {
        &self.urls
    }

    fn dispatch(&self, action: AccountAction) {
        self.dispatcher.dispatch(action);
    }

    fn chain(&self, regtest_mode: bool) -> Result<&dyn BitcoinNetwork, WalletError> {
        if !regtest_mode {
            return Ok(self.network.as_ref());
        }
        self.regtest
            .as_deref()
            .ok_or_else(|| WalletError::TransactionBuild("regtest network is not configured".into()))
    }

    // --- Account creation ---

    /// Create a new wallet, or restore one from `backup_phrase`.
    ///
    /// Dispatches a single `CreateAccount` on success and nothing on failure.
    pub fn initialize_wallet(&self, password: &str, backup_phrase: Option<&str>) -> Result<(), WalletError> {
        let fresh = keys::derive_account(backup_phrase, INITIAL_IDENTITIES)?;
        let encrypted = encrypt_encoded(fresh.phrase.as_bytes(), password, &self.kdf, Encoding::Hex)?;
        info!(restored = backup_phrase.is_some(), "wallet initialized");
        self.dispatch(account::account_snapshot(encrypted, fresh.account));
        Ok(())
    }

    /// Derive `identities_to_generate` identities from `master` and dispatch the account.
    pub fn create_account(
        &self,
        encrypted_backup_phrase: &str,
        master: &MasterKeychain,
        identities_to_generate: u32,
    ) -> Result<(), WalletError> {
        let action = account::create_account(encrypted_backup_phrase, master, identities_to_generate)?;
        self.dispatch(action);
        Ok(())
    }

    /// Derive the next identity keypair from the encrypted backup phrase and append it.
    ///
    /// Owner nodes are hardened, so the phrase has to be decrypted.
    pub fn new_identity_address(
        &self,
        encrypted_backup_phrase: &str,
        password: &str,
        index: u32,
    ) -> Result<(), WalletError> {
        let phrase = decrypt_backup_phrase(encrypted_backup_phrase, password, Encoding::Hex)?;
        let master = MasterKeychain::from_phrase(&phrase)?;
        let keypair = master.identity_keypair(index)?;
        self.dispatch(account::new_identity_address(keypair));
        Ok(())
    }

    // --- Balances ---

    /// Fetch every address's confirmed balance and publish them together.
    ///
    /// `balance_url` is a prefix the address is appended to; each response is
    /// plain-text satoshis. If any fetch fails nothing is dispatched.
    pub async fn refresh_balances(&self, balance_url: &str, addresses: &[String]) {
        let fetches = addresses.iter().map(|address| async move {
            let url = format!("{balance_url}{address}");
            let body = self.http.send(HttpRequest::get(url.as_str())).await?;
            let satoshis: u64 = body
                .trim()
                .parse()
                .map_err(|_| FetchError::Body(format!("balance for {address} is not an integer: {body}")))?;
            Ok::<_, FetchError>((address.clone(), satoshis_to_btc(satoshis)))
        });

        match try_join_all(fetches).await {
            Ok(entries) => {
                let balances = Balances::from_entries(entries);
                debug!(addresses = addresses.len(), total = balances.total, "balances refreshed");
                self.dispatch(AccountAction::UpdateBalances { balances });
            }
            Err(e) => warn!(url = balance_url, error = %e, "balance refresh failed"),
        }
    }

    // --- Core wallet ---

    /// Look up the Core wallet's payment address.
    pub async fn get_core_wallet_address(&self, wallet_payment_address_url: &str, core_api_password: &str) {
        if self.policy.is_disabled(wallet_payment_address_url) {
            return;
        }
        let request = HttpRequest::get(wallet_payment_address_url)
            .with_header("Authorization", authorization_header_value(core_api_password));

        let result = async {
            let body = self.http.send(request).await?;
            let value: Value = serde_json::from_str(&body)?;
            value["address"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| WalletError::Fetch(FetchError::Body("response has no address".into())))
        }
        .await;

        match result {
            Ok(core_wallet_address) => self.dispatch(AccountAction::UpdateCoreAddress { core_wallet_address }),
            Err(e) => {
                warn!(url = wallet_payment_address_url, error = %e, "core wallet address lookup failed");
                self.dispatch(AccountAction::UpdateCoreAddressError { error: e.to_string() });
            }
        }
    }

    /// Refresh the Core wallet balance. Disabled endpoints report zero.
    pub async fn refresh_core_wallet_balance(&self, address_balance_url: &str, core_api_password: &str) {
        if self.policy.is_disabled(address_balance_url) {
            self.dispatch(AccountAction::UpdateCoreBalance { core_wallet_balance: 0.0 });
            return;
        }
        let request = HttpRequest::get(address_balance_url)
            .with_header("Authorization", authorization_header_value(core_api_password));

        let result = async {
            let body = self.http.send(request).await?;
            let value: Value = serde_json::from_str(&body)?;
            parse_core_balance(&value["balance"]["bitcoin"])
        }
        .await;

        match result {
            Ok(core_wallet_balance) => self.dispatch(AccountAction::UpdateCoreBalance { core_wallet_balance }),
            Err(e) => warn!(url = address_balance_url, error = %e, "core wallet balance refresh failed"),
        }
    }

    pub fn reset_core_withdrawal(&self) {
        self.dispatch(AccountAction::ResetCoreBalanceWithdrawal);
    }

    /// Ask the Core wallet to send funds to `recipient_address`.
    ///
    /// `amount` is in satoshis; `None` withdraws everything.
    pub async fn withdraw_bitcoin_from_core_wallet(
        &self,
        core_wallet_withdraw_url: &str,
        recipient_address: &str,
        core_api_password: &str,
        amount: Option<u64>,
        payment_key: Option<&str>,
    ) {
        if self.policy.is_disabled(core_wallet_withdraw_url) {
            self.dispatch(AccountAction::WithdrawCoreBalanceError {
                error: WITHDRAWALS_DISABLED_MESSAGE.to_string(),
            });
            return;
        }

        self.dispatch(AccountAction::WithdrawingCoreBalance {
            recipient_address: recipient_address.to_string(),
            amount,
        });

        let mut body = json!({
            "address": recipient_address,
            "min_confs": 0,
        });
        if let Some(amount) = amount {
            body["amount"] = json!(amount);
        }
        if let Some(key) = payment_key {
            body["paymentKey"] = json!(key);
        }
        let request = HttpRequest::post_json(core_wallet_withdraw_url, &body)
            .with_header("Authorization", authorization_header_value(core_api_password));

        match self.http.send(request).await {
            Ok(text) => match withdrawal_error(&text) {
                Some(error) => {
                    warn!(url = core_wallet_withdraw_url, %error, "core wallet refused withdrawal");
                    self.dispatch(AccountAction::WithdrawCoreBalanceError { error });
                }
                None => {
                    info!(recipient = recipient_address, "core wallet withdrawal sent");
                    self.dispatch(AccountAction::WithdrawCoreBalanceSuccess);
                }
            },
            Err(e) => {
                warn!(url = core_wallet_withdraw_url, error = %e, "core wallet withdrawal failed");
                self.dispatch(AccountAction::WithdrawCoreBalanceError { error: e.to_string() });
            }
        }
    }

    // --- Local spends ---

    /// Build and sign a spend of `amount_btc` from `payment_key` to `recipient_address`.
    ///
    /// Dispatches `BuildTransaction` first, then exactly one of
    /// `BuildTransactionSuccess` or `BuildTransactionError`. In regtest mode the
    /// recipient is re-encoded for the regtest chain before building.
    pub async fn build_bitcoin_transaction(
        &self,
        regtest_mode: bool,
        payment_key: &str,
        recipient_address: &str,
        amount_btc: f64,
    ) -> Result<String, WalletError> {
        self.dispatch(AccountAction::BuildTransaction);

        let result = async {
            let chain = self.chain(regtest_mode)?;
            let amount = btc_to_satoshis(amount_btc)?;
            let recipient = if regtest_mode {
                chain.settings().coerce_address(recipient_address)?
            } else {
                recipient_address.to_string()
            };
            let key = PaymentKey::parse(payment_key)?;
            let signed = TransactionBuilder::new(chain).build(&recipient, &key, amount).await?;
            Ok::<_, WalletError>(signed.hex)
        }
        .await;

        match &result {
            Ok(tx_hex) => {
                info!(regtest = regtest_mode, bytes = tx_hex.len() / 2, "transaction built");
                self.dispatch(AccountAction::BuildTransactionSuccess { tx_hex: tx_hex.clone() });
            }
            Err(e) => {
                warn!(regtest = regtest_mode, error = %e, "transaction build failed");
                self.dispatch(AccountAction::BuildTransactionError { error: e.to_string() });
            }
        }
        result
    }

    /// Broadcast a signed transaction on the selected network.
    ///
    /// Dispatches `BroadcastTransaction` first, then success or error.
    pub async fn broadcast_bitcoin_transaction(&self, regtest_mode: bool, tx_hex: &str) -> Result<String, WalletError> {
        self.dispatch(AccountAction::BroadcastTransaction { tx_hex: tx_hex.to_string() });

        let result = match self.chain(regtest_mode) {
            Ok(chain) => TransactionBuilder::new(chain).broadcast(tx_hex).await,
            Err(e) => Err(WalletError::Broadcast(e.to_string())),
        };

        match &result {
            Ok(confirmation) => {
                info!(regtest = regtest_mode, %confirmation, "transaction broadcast");
                self.dispatch(AccountAction::BroadcastTransactionSuccess { tx_hex: tx_hex.to_string() });
            }
            Err(e) => {
                warn!(regtest = regtest_mode, error = %e, "broadcast failed");
                self.dispatch(AccountAction::BroadcastTransactionError { error: e.to_string() });
            }
        }
        result
    }

    /// Build then broadcast. Stops after a failed build.
    pub async fn send_bitcoin(
        &self,
        regtest_mode: bool,
        payment_key: &str,
        recipient_address: &str,
        amount_btc: f64,
    ) -> Result<String, WalletError> {
        let tx_hex = self
            .build_bitcoin_transaction(regtest_mode, payment_key, recipient_address, amount_btc)
            .await?;
        self.broadcast_bitcoin_transaction(regtest_mode, &tx_hex).await
    }

    // --- Email and onboarding facets ---

    /// Record the email prompt and register the address with the mailing list.
    ///
    /// Delivery failures are logged and otherwise ignored.
    pub async fn email_notifications(&self, email: &str, opt_in: bool) {
        self.dispatch(AccountAction::PromptedForEmail {
            email: Some(email.to_string()),
        });
        let url = format!("{}?mailingListOptIn={opt_in}", self.urls.emailer_url);
        let request = HttpRequest::post_json(url.as_str(), &json!({ "email": email }));
        match self.http.send(request).await {
            Ok(_) => debug!(opt_in, "email registered"),
            Err(e) => warn!(url = %url, error = %e, "email registration failed"),
        }
    }

    pub fn skip_email_backup(&self) {
        self.dispatch(AccountAction::PromptedForEmail { email: None });
    }

    pub fn storage_is_connected(&self) {
        self.dispatch(AccountAction::ConnectedStorage);
    }

    pub fn displayed_recovery_code(&self) {
        self.dispatch(account::update_viewed_recovery_code());
    }

    pub fn do_verify_recovery_code(&self) {
        self.dispatch(AccountAction::RecoveryCodeVerified);
    }

    /// Mark the current identity address as used.
    pub fn used_identity_address(&self) {
        self.dispatch(account::increment_identity_address_index());
    }
}

/// Core reports the balance as a number, or sometimes as a numeric string.
fn parse_core_balance(value: &Value) -> Result<f64, WalletError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| WalletError::Fetch(FetchError::Body(format!("unexpected bitcoin balance: {value}"))))
}

/// The `error` field of a withdrawal response, if any. Empty bodies are success.
fn withdrawal_error(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match &value["error"] {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccountStore, RecordingDispatcher};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sigil_core::error::NetworkError;
    use sigil_core::network::NetworkSettings;
    use sigil_core::types::{HttpMethod, Utxo};

    const PHRASE: &str = "sound idle panel often situate develop unit text design antenna vendor screen opinion balcony share trigger accuse scatter visa uniform brass update opinion media";
    const WIF: &str = "L5HA8txJqKzQAbj2LCG9uTPkTHYdt6fHVsL3TYac5hQsi2BCFstp";

    /// Answers requests by URL; unknown URLs fail.
    #[derive(Default)]
    struct MockHttp {
        replies: Mutex<Vec<(String, Result<String, FetchError>)>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl MockHttp {
        fn reply(self, url: &str, reply: Result<String, FetchError>) -> Self {
            self.replies.lock().push((url.to_string(), reply));
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttp {
        async fn send(&self, request: HttpRequest) -> Result<String, FetchError> {
            self.seen.lock().push(request.clone());
            self.replies
                .lock()
                .iter()
                .find(|(url, _)| *url == request.url)
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| {
                    Err(FetchError::Request {
                        url: request.url.clone(),
                        message: "unreachable".into(),
                    })
                })
        }
    }

    struct MockChain {
        settings: NetworkSettings,
        utxos: Vec<Utxo>,
        broadcast: Result<String, NetworkError>,
        queried: Mutex<Vec<String>>,
        broadcasts: Mutex<Vec<String>>,
    }

    impl MockChain {
        fn new(settings: NetworkSettings) -> Self {
            Self {
                settings,
                utxos: vec![Utxo {
                    txid: "11".repeat(32),
                    vout: 0,
                    value: 2 * 100_000_000,
                    confirmed: true,
                }],
                broadcast: Ok("txid".into()),
                queried: Mutex::new(Vec::new()),
                broadcasts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BitcoinNetwork for MockChain {
        fn settings(&self) -> &NetworkSettings {
            &self.settings
        }

        async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, NetworkError> {
            self.queried.lock().push(address.to_string());
            Ok(self.utxos.clone())
        }

        async fn get_fee_rate(&self) -> Result<u64, NetworkError> {
            Ok(1)
        }

        async fn broadcast_transaction(&self, tx_hex: &str) -> Result<String, NetworkError> {
            self.broadcasts.lock().push(tx_hex.to_string());
            self.broadcast.clone()
        }
    }

    struct Harness {
        http: Arc<MockHttp>,
        chain: Arc<MockChain>,
        regtest: Arc<MockChain>,
        recorder: Arc<RecordingDispatcher>,
        actions: AccountActions,
    }

    fn harness_with(http: MockHttp, chain: MockChain, policy: CoreEndpointPolicy) -> Harness {
        let http = Arc::new(http);
        let chain = Arc::new(chain);
        let regtest = Arc::new(MockChain::new(NetworkSettings::local_regtest()));
        let recorder = Arc::new(RecordingDispatcher::new());
        let actions = AccountActions::new(http.clone(), chain.clone(), recorder.clone())
            .with_regtest_network(regtest.clone())
            .with_policy(Arc::new(policy))
            .with_kdf_params(KdfParams::interactive());
        Harness {
            http,
            chain,
            regtest,
            recorder,
            actions,
        }
    }

    fn harness(http: MockHttp) -> Harness {
        harness_with(
            http,
            MockChain::new(NetworkSettings::mainnet("https://core.example")),
            CoreEndpointPolicy::default(),
        )
    }

    fn webapp_harness(http: MockHttp) -> Harness {
        harness_with(
            http,
            MockChain::new(NetworkSettings::mainnet("https://core.example")),
            CoreEndpointPolicy::webapp(),
        )
    }

    // --- initialize_wallet ---

    #[test]
    fn initialize_new_wallet_dispatches_one_create() {
        let h = harness(MockHttp::default());
        h.actions.initialize_wallet("password", None).unwrap();
        let actions = h.recorder.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], AccountAction::CreateAccount { .. }));
    }

    #[test]
    fn initialize_restores_known_vectors() {
        let h = harness(MockHttp::default());
        h.actions.initialize_wallet("password", Some(PHRASE)).unwrap();
        let AccountAction::CreateAccount {
            bitcoin_public_keychain,
            identity_public_keychain,
            first_bitcoin_address,
            identity_addresses,
            identity_keypairs,
            ..
        } = h.recorder.take().remove(0)
        else {
            panic!("expected CreateAccount");
        };
        assert_eq!(
            bitcoin_public_keychain,
            "xpub6Br2scNTh9Luk2VPebfEvjbWWC5WhvxpxgK8ap2qhYTS4xvZu8Y3G1npmx8DdvwUdCbtNb7qNLyTChKMbY8dThLV5Zvdq9AojQjxrM6gTC8"
        );
        assert_eq!(
            identity_public_keychain,
            "xpub6B6tCCb8T5eXUKVYUoppmSi5KhNRboRJUwqHavxdvQTncfmBNFCX4Nq9w8DsfuS6AYPpBYRuS3dcUuyF8mQtwEydAEN3A4Cx6HDy58jpKEb"
        );
        assert_eq!(first_bitcoin_address, "112FogMTesWmLzkWbtKrSg3p9LK6Lucn4s");
        assert_eq!(identity_addresses, vec!["1JeTQ5cQjsD57YGcsVFhwT7iuQUXJR6BSk"]);
        assert_eq!(
            identity_keypairs[0].key,
            "a29c3e73dba79ab0f84cb792bafd65ec71f243ebe67a7ebd842ef5cdce3b21eb"
        );
    }

    #[test]
    fn generated_wallet_restores_identically() {
        let h = harness(MockHttp::default());
        h.actions.initialize_wallet("password", None).unwrap();
        let AccountAction::CreateAccount {
            encrypted_backup_phrase,
            bitcoin_public_keychain,
            identity_public_keychain,
            ..
        } = h.recorder.take().remove(0)
        else {
            panic!("expected CreateAccount");
        };

        let phrase = decrypt_backup_phrase(&encrypted_backup_phrase, "password", Encoding::Hex).unwrap();
        h.actions.initialize_wallet("password", Some(phrase.as_str())).unwrap();
        let AccountAction::CreateAccount {
            bitcoin_public_keychain: restored_btc,
            identity_public_keychain: restored_id,
            ..
        } = h.recorder.take().remove(0)
        else {
            panic!("expected CreateAccount");
        };
        assert_eq!(restored_btc, bitcoin_public_keychain);
        assert_eq!(restored_id, identity_public_keychain);
    }

    #[test]
    fn initialize_with_bad_phrase_dispatches_nothing() {
        let h = harness(MockHttp::default());
        let err = h.actions.initialize_wallet("password", Some("not a phrase")).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
        assert!(h.recorder.actions().is_empty());
    }

    #[test]
    fn wrong_password_cannot_read_phrase() {
        let h = harness(MockHttp::default());
        h.actions.initialize_wallet("password", Some(PHRASE)).unwrap();
        let AccountAction::CreateAccount {
            encrypted_backup_phrase,
            ..
        } = h.recorder.take().remove(0)
        else {
            panic!("expected CreateAccount");
        };
        let err = decrypt_backup_phrase(&encrypted_backup_phrase, "wrong", Encoding::Hex).unwrap_err();
        assert_eq!(err, WalletError::Decryption);
    }

    #[test]
    fn new_identity_address_derives_next_index() {
        let h = harness(MockHttp::default());
        h.actions.initialize_wallet("password", Some(PHRASE)).unwrap();
        let AccountAction::CreateAccount {
            encrypted_backup_phrase,
            ..
        } = h.recorder.take().remove(0)
        else {
            panic!("expected CreateAccount");
        };
        h.actions
            .new_identity_address(&encrypted_backup_phrase, "password", 1)
            .unwrap();
        let AccountAction::NewIdentityAddress { keypair } = h.recorder.take().remove(0) else {
            panic!("expected NewIdentityAddress");
        };
        assert_eq!(keypair.address, "14jdV3dEQ7TmEaZePaLmKgMDg9Y48UFTL3");
    }

    // --- refresh_balances ---

    #[tokio::test]
    async fn refresh_balances_publishes_once_with_total() {
        let http = MockHttp::default()
            .reply("https://bal/a1", Ok("100000000".into()))
            .reply("https://bal/a2", Ok(" 50000000\n".into()));
        let h = harness(http);
        h.actions
            .refresh_balances("https://bal/", &["a1".to_string(), "a2".to_string()])
            .await;

        let actions = h.recorder.actions();
        assert_eq!(actions.len(), 1);
        let AccountAction::UpdateBalances { balances } = &actions[0] else {
            panic!("expected UpdateBalances");
        };
        assert_eq!(balances.by_address["a1"], 1.0);
        assert_eq!(balances.by_address["a2"], 0.5);
        assert_eq!(balances.total, 1.5);
    }

    #[tokio::test]
    async fn refresh_balances_failure_dispatches_nothing() {
        let http = MockHttp::default().reply("https://bal/a1", Ok("100".into()));
        let h = harness(http);
        h.actions
            .refresh_balances("https://bal/", &["a1".to_string(), "missing".to_string()])
            .await;
        assert!(h.recorder.actions().is_empty());
    }

    #[tokio::test]
    async fn refresh_balances_rejects_non_numeric_body() {
        let http = MockHttp::default().reply("https://bal/a1", Ok("<html>".into()));
        let h = harness(http);
        h.actions.refresh_balances("https://bal/", &["a1".to_string()]).await;
        assert!(h.recorder.actions().is_empty());
    }

    #[tokio::test]
    async fn refresh_balances_with_no_addresses_publishes_zero() {
        let h = harness(MockHttp::default());
        h.actions.refresh_balances("https://bal/", &[]).await;
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::UpdateBalances {
                balances: Balances::default()
            }]
        );
    }

    // --- Core wallet ---

    const CORE_ADDRESS_URL: &str = "http://localhost:6270/v1/wallet/payment_address";
    const CORE_BALANCE_URL: &str = "http://localhost:6270/v1/wallet/balance/0";
    const CORE_WITHDRAW_URL: &str = "http://localhost:6270/v1/wallet/balance";

    #[tokio::test]
    async fn core_address_disabled_does_nothing() {
        let h = webapp_harness(MockHttp::default());
        h.actions.get_core_wallet_address(CORE_ADDRESS_URL, "pw").await;
        assert!(h.recorder.actions().is_empty());
        assert!(h.http.requests().is_empty());
    }

    #[tokio::test]
    async fn core_address_sends_auth_and_dispatches() {
        let http = MockHttp::default().reply(CORE_ADDRESS_URL, Ok(r#"{"address":"1core"}"#.into()));
        let h = harness(http);
        h.actions.get_core_wallet_address(CORE_ADDRESS_URL, "pw").await;
        assert_eq!(h.http.requests()[0].header("Authorization"), Some("bearer pw"));
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::UpdateCoreAddress {
                core_wallet_address: "1core".into()
            }]
        );
    }

    #[tokio::test]
    async fn core_address_failure_dispatches_error() {
        let h = harness(MockHttp::default());
        h.actions.get_core_wallet_address(CORE_ADDRESS_URL, "pw").await;
        let actions = h.recorder.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], AccountAction::UpdateCoreAddressError { .. }));
    }

    #[tokio::test]
    async fn core_balance_disabled_reports_zero_without_request() {
        let h = webapp_harness(MockHttp::default());
        h.actions.refresh_core_wallet_balance(CORE_BALANCE_URL, "pw").await;
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::UpdateCoreBalance { core_wallet_balance: 0.0 }]
        );
        assert!(h.http.requests().is_empty());
    }

    #[tokio::test]
    async fn core_balance_parses_bitcoin_field() {
        let http = MockHttp::default().reply(CORE_BALANCE_URL, Ok(r#"{"balance":{"bitcoin":0.25}}"#.into()));
        let h = harness(http);
        h.actions.refresh_core_wallet_balance(CORE_BALANCE_URL, "pw").await;
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::UpdateCoreBalance { core_wallet_balance: 0.25 }]
        );
        assert_eq!(h.http.requests()[0].header("Authorization"), Some("bearer pw"));
    }

    #[tokio::test]
    async fn core_balance_failure_is_swallowed() {
        let h = harness(MockHttp::default());
        h.actions.refresh_core_wallet_balance(CORE_BALANCE_URL, "pw").await;
        assert!(h.recorder.actions().is_empty());
    }

    #[test]
    fn core_balance_accepts_numeric_string() {
        assert_eq!(parse_core_balance(&json!("1.5")).unwrap(), 1.5);
        assert!(parse_core_balance(&json!(null)).is_err());
    }

    #[tokio::test]
    async fn withdraw_disabled_refuses_once() {
        let h = webapp_harness(MockHttp::default());
        h.actions
            .withdraw_bitcoin_from_core_wallet(CORE_WITHDRAW_URL, "1dest", "pw", None, None)
            .await;
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::WithdrawCoreBalanceError {
                error: WITHDRAWALS_DISABLED_MESSAGE.into()
            }]
        );
        assert!(h.http.requests().is_empty());
    }

    #[tokio::test]
    async fn withdraw_posts_request() {
        let http = MockHttp::default().reply(CORE_WITHDRAW_URL, Ok(String::new()));
        let h = harness(http);
        h.actions
            .withdraw_bitcoin_from_core_wallet(CORE_WITHDRAW_URL, "1dest", "pw", Some(5000), Some("key"))
            .await;

        let req = &h.http.requests()[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Authorization"), Some("bearer pw"));
        let body = req.json_body().unwrap();
        assert_eq!(body["address"], "1dest");
        assert_eq!(body["min_confs"], 0);
        assert_eq!(body["amount"], 5000);
        assert_eq!(body["paymentKey"], "key");

        assert_eq!(
            h.recorder.actions(),
            vec![
                AccountAction::WithdrawingCoreBalance {
                    recipient_address: "1dest".into(),
                    amount: Some(5000),
                },
                AccountAction::WithdrawCoreBalanceSuccess,
            ]
        );
    }

    #[tokio::test]
    async fn withdraw_omits_optional_fields() {
        let http = MockHttp::default().reply(CORE_WITHDRAW_URL, Ok("{}".into()));
        let h = harness(http);
        h.actions
            .withdraw_bitcoin_from_core_wallet(CORE_WITHDRAW_URL, "1dest", "pw", None, None)
            .await;
        let body = h.http.requests()[0].json_body().unwrap();
        assert!(body.get("amount").is_none());
        assert!(body.get("paymentKey").is_none());
        assert_eq!(h.recorder.actions()[1], AccountAction::WithdrawCoreBalanceSuccess);
    }

    #[tokio::test]
    async fn withdraw_surfaces_response_error() {
        let http = MockHttp::default().reply(CORE_WITHDRAW_URL, Ok(r#"{"error":"an error"}"#.into()));
        let h = harness(http);
        h.actions
            .withdraw_bitcoin_from_core_wallet(CORE_WITHDRAW_URL, "1dest", "pw", None, None)
            .await;
        assert_eq!(
            h.recorder.actions()[1],
            AccountAction::WithdrawCoreBalanceError {
                error: "an error".into()
            }
        );
    }

    #[tokio::test]
    async fn withdraw_transport_failure_is_error_action() {
        let h = harness(MockHttp::default());
        h.actions
            .withdraw_bitcoin_from_core_wallet(CORE_WITHDRAW_URL, "1dest", "pw", None, None)
            .await;
        let actions = h.recorder.actions();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], AccountAction::WithdrawCoreBalanceError { .. }));
    }

    // --- build / broadcast ---

    #[tokio::test]
    async fn build_dispatches_progress_then_success() {
        let h = harness(MockHttp::default());
        let hex = h
            .actions
            .build_bitcoin_transaction(false, WIF, "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW", 1.0)
            .await
            .unwrap();

        let actions = h.recorder.actions();
        assert_eq!(actions[0], AccountAction::BuildTransaction);
        assert_eq!(actions[1], AccountAction::BuildTransactionSuccess { tx_hex: hex.clone() });
        assert_eq!(actions.len(), 2);
        assert_eq!(*h.chain.queried.lock(), vec!["112FogMTesWmLzkWbtKrSg3p9LK6Lucn4s".to_string()]);
    }

    #[tokio::test]
    async fn one_btc_requests_one_hundred_million_satoshis() {
        let h = harness(MockHttp::default());
        let hex = h
            .actions
            .build_bitcoin_transaction(false, WIF, "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW", 1.0)
            .await
            .unwrap();
        let tx: bitcoin::Transaction = bitcoin::consensus::encode::deserialize_hex(&hex).unwrap();
        let fee = 2 * 100_000_000 - tx.output.iter().map(|o| o.value.to_sat()).sum::<u64>();
        assert_eq!(tx.output[0].value.to_sat() + fee, 100_000_000);
    }

    #[tokio::test]
    async fn build_failure_dispatches_error_message() {
        let h = harness(MockHttp::default());
        let err = h
            .actions
            .build_bitcoin_transaction(false, "not-a-key", "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW", 1.0)
            .await
            .unwrap_err();
        assert_eq!(
            h.recorder.actions(),
            vec![
                AccountAction::BuildTransaction,
                AccountAction::BuildTransactionError { error: err.to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn regtest_build_uses_regtest_chain_and_coerces_recipient() {
        let h = harness(MockHttp::default());
        h.actions
            .build_bitcoin_transaction(true, WIF, "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW", 0.5)
            .await
            .unwrap();
        assert!(h.chain.queried.lock().is_empty());
        let queried = h.regtest.queried.lock().clone();
        assert_eq!(queried.len(), 1);
        assert!(queried[0].starts_with('m') || queried[0].starts_with('n'));
    }

    #[tokio::test]
    async fn regtest_without_network_fails_build() {
        let recorder = Arc::new(RecordingDispatcher::new());
        let actions = AccountActions::new(
            Arc::new(MockHttp::default()),
            Arc::new(MockChain::new(NetworkSettings::mainnet("https://core.example"))),
            recorder.clone(),
        );
        assert!(actions.build_bitcoin_transaction(true, WIF, "1abc", 1.0).await.is_err());
        assert!(matches!(
            recorder.actions()[1],
            AccountAction::BuildTransactionError { .. }
        ));
    }

    #[tokio::test]
    async fn broadcast_settles_with_success() {
        let h = harness(MockHttp::default());
        h.actions.broadcast_bitcoin_transaction(false, "00ff").await.unwrap();
        assert_eq!(
            h.recorder.actions(),
            vec![
                AccountAction::BroadcastTransaction { tx_hex: "00ff".into() },
                AccountAction::BroadcastTransactionSuccess { tx_hex: "00ff".into() },
            ]
        );
        assert_eq!(*h.chain.broadcasts.lock(), vec!["00ff".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_failure_carries_message() {
        let mut chain = MockChain::new(NetworkSettings::mainnet("https://core.example"));
        chain.broadcast = Err(NetworkError::Broadcast("fake error".into()));
        let h = harness_with(MockHttp::default(), chain, CoreEndpointPolicy::default());
        let err = h.actions.broadcast_bitcoin_transaction(false, "00ff").await.unwrap_err();
        assert!(err.to_string().contains("fake error"));
        assert_eq!(
            h.recorder.actions()[1],
            AccountAction::BroadcastTransactionError { error: err.to_string() }
        );
    }

    #[tokio::test]
    async fn regtest_broadcast_goes_to_regtest_chain() {
        let h = harness(MockHttp::default());
        h.actions.broadcast_bitcoin_transaction(true, "00ff").await.unwrap();
        assert!(h.chain.broadcasts.lock().is_empty());
        assert_eq!(h.regtest.broadcasts.lock().len(), 1);
    }

    #[tokio::test]
    async fn send_drives_store_through_pipeline() {
        let http = Arc::new(MockHttp::default());
        let chain = Arc::new(MockChain::new(NetworkSettings::mainnet("https://core.example")));
        let store = Arc::new(AccountStore::new());
        let actions = AccountActions::new(http, chain, store.clone());
        actions
            .send_bitcoin(false, WIF, "19VvXWtT3fXLtbiGVmNuQUy1nKQ9FmppZW", 0.1)
            .await
            .unwrap();
        let withdrawal = store.snapshot().core_wallet.withdrawal;
        assert!(withdrawal.success);
        assert!(!withdrawal.in_progress);
        assert!(withdrawal.tx_hex.is_some());
    }

    // --- email and facets ---

    #[tokio::test]
    async fn email_prompt_dispatched_before_post() {
        let h = harness(MockHttp::default());
        h.actions.email_notifications("nico.id@example.com", true).await;
        assert_eq!(
            h.recorder.actions(),
            vec![AccountAction::PromptedForEmail {
                email: Some("nico.id@example.com".into())
            }]
        );
        let req = &h.http.requests()[0];
        assert_eq!(
            req.url,
            "https://blockstack-portal-emailer.appartisan.com/notifications?mailingListOptIn=true"
        );
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.json_body().unwrap(), json!({"email": "nico.id@example.com"}));
    }

    #[tokio::test]
    async fn email_opt_out_query() {
        let h = harness(MockHttp::default());
        h.actions.email_notifications("a@b.c", false).await;
        assert!(h.http.requests()[0].url.ends_with("?mailingListOptIn=false"));
    }

    #[test]
    fn dispatching_helpers() {
        let h = harness(MockHttp::default());
        h.actions.skip_email_backup();
        h.actions.storage_is_connected();
        h.actions.displayed_recovery_code();
        h.actions.do_verify_recovery_code();
        h.actions.used_identity_address();
        h.actions.reset_core_withdrawal();
        assert_eq!(
            h.recorder.actions(),
            vec![
                AccountAction::PromptedForEmail { email: None },
                AccountAction::ConnectedStorage,
                AccountAction::ViewedRecoveryCode,
                AccountAction::RecoveryCodeVerified,
                AccountAction::IncrementIdentityAddressIndex,
                AccountAction::ResetCoreBalanceWithdrawal,
            ]
        );
    }

    #[test]
    fn withdrawal_error_parsing() {
        assert_eq!(withdrawal_error(""), None);
        assert_eq!(withdrawal_error("{}"), None);
        assert_eq!(withdrawal_error(r#"{"error":"nope"}"#), Some("nope".into()));
        assert_eq!(withdrawal_error(r#"{"error":{"code":1}}"#), Some(r#"{"code":1}"#.into()));
    }
}

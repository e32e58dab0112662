//! CLI configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::{bail, Result};
use sigil_core::constants::{
    DEFAULT_CORE_API_URL, LOCAL_REGTEST_BITCOIND_PASSWORD, LOCAL_REGTEST_BITCOIND_URL,
    LOCAL_REGTEST_BITCOIND_USER,
};
use sigil_core::network::NetworkSettings;
use sigil_wallet::core_api::{DEFAULT_BALANCE_URL, DEFAULT_EMAILER_URL};
use sigil_wallet::{CoreEndpointPolicy, ServiceUrls};

/// Name of the account file inside the data directory.
pub const ACCOUNT_FILE: &str = "account.json";

const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";

#[derive(Clone, Debug)]
pub struct CliConfig {
    /// Directory holding the account file.
    pub data_dir: PathBuf,
    /// Prefix for per-address balance lookups.
    pub balance_url: String,
    /// Esplora REST base for UTXOs, fees and broadcast.
    pub esplora_url: String,
    pub core_api_url: String,
    /// Web-app builds never contact the Core API.
    pub webapp_build: bool,
    pub bitcoind_url: String,
    pub bitcoind_user: String,
    pub bitcoind_password: String,
    pub emailer_url: String,
}

impl CliConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("SIGIL_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sigil"),
        };

        let webapp_build = match lookup("SIGIL_WEBAPP_BUILD").as_deref() {
            None => true,
            Some(v) => parse_bool(v)?,
        };

        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(CliConfig {
            data_dir,
            balance_url: get("SIGIL_BALANCE_URL", DEFAULT_BALANCE_URL),
            esplora_url: get("SIGIL_ESPLORA_URL", DEFAULT_ESPLORA_URL),
            core_api_url: get("SIGIL_CORE_API_URL", DEFAULT_CORE_API_URL),
            webapp_build,
            bitcoind_url: get("SIGIL_BITCOIND_URL", LOCAL_REGTEST_BITCOIND_URL),
            bitcoind_user: get("SIGIL_BITCOIND_USER", LOCAL_REGTEST_BITCOIND_USER),
            bitcoind_password: get("SIGIL_BITCOIND_PASSWORD", LOCAL_REGTEST_BITCOIND_PASSWORD),
            emailer_url: get("SIGIL_EMAILER_URL", DEFAULT_EMAILER_URL),
        })
    }

    pub fn account_path(&self) -> PathBuf {
        self.data_dir.join(ACCOUNT_FILE)
    }

    pub fn endpoint_policy(&self) -> CoreEndpointPolicy {
        CoreEndpointPolicy::new(self.webapp_build, self.core_api_url.as_str())
    }

    pub fn service_urls(&self) -> ServiceUrls {
        ServiceUrls {
            balance_url: self.balance_url.clone(),
            emailer_url: self.emailer_url.clone(),
            ..ServiceUrls::for_core_api(&self.core_api_url)
        }
    }

    pub fn mainnet_settings(&self) -> NetworkSettings {
        NetworkSettings::mainnet(self.core_api_url.as_str())
    }

    pub fn regtest_settings(&self) -> NetworkSettings {
        NetworkSettings {
            bitcoind_url: Some(self.bitcoind_url.clone()),
            ..NetworkSettings::local_regtest()
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("SIGIL_WEBAPP_BUILD must be a boolean, got {other:?}"),
    }
}

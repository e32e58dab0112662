//! Wallet constants. All monetary values in satoshis (1 BTC = 10^8 satoshis).

pub const COIN: u64 = 100_000_000;

/// Smallest output value the spend builder will create.
pub const DUST_MINIMUM: u64 = 5_500;

/// Base URL of the Core API node when running against a local regtest chain.
pub const LOCAL_REGTEST_API_URL: &str = "http://localhost:6270";

/// bitcoind JSON-RPC endpoint of the local regtest chain.
pub const LOCAL_REGTEST_BITCOIND_URL: &str = "http://localhost:18332";

/// RPC credentials baked into the integration-test regtest image.
pub const LOCAL_REGTEST_BITCOIND_USER: &str = "blockstack";
pub const LOCAL_REGTEST_BITCOIND_PASSWORD: &str = "blockstacksystem";

/// Default Core API base URL used to decide whether an endpoint is Core-backed.
pub const DEFAULT_CORE_API_URL: &str = "http://localhost:6270";

/// Base58 version byte of a mainnet P2PKH address.
pub const MAINNET_P2PKH_VERSION: u8 = 0x00;
/// Base58 version byte of a mainnet P2SH address.
pub const MAINNET_P2SH_VERSION: u8 = 0x05;
/// Base58 version byte of a testnet/regtest P2PKH address.
pub const TESTNET_P2PKH_VERSION: u8 = 0x6f;
/// Base58 version byte of a testnet/regtest P2SH address.
pub const TESTNET_P2SH_VERSION: u8 = 0xc4;

/// Fee rate assumed when a network cannot estimate one (sat/vbyte).
pub const FALLBACK_FEE_RATE: u64 = 10;

/// Serialized size estimates for legacy P2PKH transactions, in bytes.
pub const TX_OVERHEAD_BYTES: u64 = 10;
pub const P2PKH_INPUT_BYTES: u64 = 148;
pub const P2PKH_OUTPUT_BYTES: u64 = 34;

/// Hardened purpose index of the BIP44 bitcoin keychain.
pub const BIP44_PURPOSE: u32 = 44;
/// BIP44 coin type for bitcoin.
pub const BITCOIN_COIN_TYPE: u32 = 0;
/// BIP44 account index of the payment keychain.
pub const BITCOIN_ACCOUNT_INDEX: u32 = 0;
/// External (receive) chain of the payment keychain.
pub const EXTERNAL_ADDRESS_CHAIN: u32 = 0;

/// Hardened index of the identity keychain under the master node.
pub const IDENTITY_KEYCHAIN: u32 = 888;
/// Hardened index of the identity keychain's bitcoin-anchored branch.
pub const BLOCKSTACK_ON_BITCOIN: u32 = 0;
/// Hardened index of the apps node below each identity owner node.
pub const APPS_NODE_INDEX: u32 = 0;

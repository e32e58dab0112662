//! # sigil-wallet
//! Seed-derived identity and bitcoin key management.
//!
//! Turns a BIP-39 backup phrase into an identity keychain and a bitcoin
//! keychain, keeps the phrase encrypted under a password, tracks the single
//! account record through a reducer, and builds and broadcasts signed
//! bitcoin spends.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`encryption`]: Argon2id + AES-256-GCM backup phrase encryption
//! - [`mnemonic`]: BIP-39 phrase generation and seed stretching
//! - [`keys`]: BIP-32 identity and bitcoin hierarchies
//! - [`coin_selection`]: UTXO selection with fee and change planning
//! - [`builder`]: P2PKH transaction signing and broadcast
//! - [`account`]: Account record, actions and reducer
//! - [`store`]: Dispatchers, including the in-memory account store
//! - [`core_api`]: Core API endpoints, credentials and endpoint policy
//! - [`actions`]: Asynchronous account operations

pub mod account;
pub mod actions;
pub mod builder;
pub mod coin_selection;
pub mod core_api;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod store;

// Re-exports for convenient access
pub use account::{reduce, AccountAction, AccountState, Balances};
pub use actions::{decrypt_backup_phrase, AccountActions};
pub use builder::{PaymentKey, PendingTransaction, SignedTransaction, TransactionBuilder};
pub use coin_selection::{CoinSelector, SpendPlan};
pub use core_api::{authorization_header_value, CoreEndpointPolicy, ServiceUrls};
pub use encryption::{decrypt, encrypt, Encoding, KdfParams};
pub use error::WalletError;
pub use keys::{derive_account, DerivedAccount, IdentityKeypair, MasterKeychain, NewAccount, Seed};
pub use store::{AccountStore, Dispatcher, RecordingDispatcher};

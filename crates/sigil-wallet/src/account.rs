//! The account record, the actions that change it, and the reducer.
//!
//! Every change to an [`AccountState`] is expressed as an [`AccountAction`]
//! and applied by [`reduce`]. Actions serialize with a `type` tag in
//! SCREAMING_SNAKE_CASE so recorded action logs read like the events they
//! describe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WalletError;
use crate::keys::{self, DerivedAccount, IdentityKeypair, MasterKeychain};

/// Cached bitcoin balances in BTC: one entry per address plus the sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(flatten)]
    pub by_address: BTreeMap<String, f64>,
    pub total: f64,
}

impl Balances {
    /// Build from per-address BTC balances, summing into `total`.
    ///
    /// The total is accumulated in input order. A repeated address keeps its
    /// last balance and is counted once.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        let mut by_address = BTreeMap::new();
        let mut total = 0.0;
        for (address, balance) in entries {
            if let Some(previous) = by_address.insert(address, balance) {
                total -= previous;
            }
            total += balance;
        }
        Self { by_address, total }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAccount {
    pub public_keychain: Option<String>,
    pub addresses: Vec<String>,
    pub keypairs: Vec<IdentityKeypair>,
    /// Next unused identity index. Only ever increases.
    pub address_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitcoinAccount {
    pub public_keychain: Option<String>,
    pub addresses: Vec<String>,
    pub address_index: u32,
    pub balances: Balances,
}

/// Progress of the current Core withdrawal or local send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub in_progress: bool,
    pub recipient_address: Option<String>,
    /// Requested satoshis. `None` withdraws the full balance.
    pub amount: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub tx_hex: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreWallet {
    pub address: Option<String>,
    pub address_error: Option<String>,
    pub balance: f64,
    pub withdrawal: Withdrawal,
}

/// The single logical account owned by this wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub account_created: bool,
    pub encrypted_backup_phrase: Option<String>,
    pub identity_account: IdentityAccount,
    pub bitcoin_account: BitcoinAccount,
    pub core_wallet: CoreWallet,
    pub prompted_for_email: bool,
    pub email: Option<String>,
    pub viewed_recovery_code: bool,
    pub recovery_code_verified: bool,
    pub connected_storage: bool,
}

impl AccountState {
    /// Identity keypair at `index`, if it has been derived.
    pub fn identity_keypair(&self, index: usize) -> Option<&IdentityKeypair> {
        self.identity_account.keypairs.get(index)
    }

    pub fn first_bitcoin_address(&self) -> Option<&str> {
        self.bitcoin_account.addresses.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum AccountAction {
    CreateAccount {
        encrypted_backup_phrase: String,
        bitcoin_public_keychain: String,
        first_bitcoin_address: String,
        identity_public_keychain: String,
        identity_addresses: Vec<String>,
        identity_keypairs: Vec<IdentityKeypair>,
    },
    DeleteAccount,
    UpdateBackupPhrase {
        encrypted_backup_phrase: String,
    },
    NewBitcoinAddress,
    NewIdentityAddress {
        keypair: IdentityKeypair,
    },
    IncrementIdentityAddressIndex,
    UpdateBalances {
        balances: Balances,
    },
    UpdateCoreAddress {
        core_wallet_address: String,
    },
    UpdateCoreAddressError {
        error: String,
    },
    UpdateCoreBalance {
        core_wallet_balance: f64,
    },
    ResetCoreBalanceWithdrawal,
    WithdrawingCoreBalance {
        recipient_address: String,
        amount: Option<u64>,
    },
    WithdrawCoreBalanceSuccess,
    WithdrawCoreBalanceError {
        error: String,
    },
    BuildTransaction,
    BuildTransactionSuccess {
        tx_hex: String,
    },
    BuildTransactionError {
        error: String,
    },
    BroadcastTransaction {
        tx_hex: String,
    },
    BroadcastTransactionSuccess {
        tx_hex: String,
    },
    BroadcastTransactionError {
        error: String,
    },
    PromptedForEmail {
        email: Option<String>,
    },
    ConnectedStorage,
    ViewedRecoveryCode,
    RecoveryCodeVerified,
}

// --- Action creators ---

/// Derive `identities_to_generate` identities and package a full account snapshot.
pub fn create_account(
    encrypted_backup_phrase: impl Into<String>,
    master: &MasterKeychain,
    identities_to_generate: u32,
) -> Result<AccountAction, WalletError> {
    let derived = master.derive_account(identities_to_generate)?;
    Ok(account_snapshot(encrypted_backup_phrase, derived))
}

/// Package an already derived account.
pub fn account_snapshot(encrypted_backup_phrase: impl Into<String>, derived: DerivedAccount) -> AccountAction {
    AccountAction::CreateAccount {
        encrypted_backup_phrase: encrypted_backup_phrase.into(),
        bitcoin_public_keychain: derived.bitcoin_public_keychain,
        first_bitcoin_address: derived.first_bitcoin_address,
        identity_public_keychain: derived.identity_public_keychain,
        identity_addresses: derived.identity_addresses,
        identity_keypairs: derived.identity_keypairs,
    }
}

pub fn update_backup_phrase(encrypted_backup_phrase: impl Into<String>) -> AccountAction {
    AccountAction::UpdateBackupPhrase {
        encrypted_backup_phrase: encrypted_backup_phrase.into(),
    }
}

pub fn new_bitcoin_address() -> AccountAction {
    AccountAction::NewBitcoinAddress
}

pub fn delete_account() -> AccountAction {
    AccountAction::DeleteAccount
}

pub fn increment_identity_address_index() -> AccountAction {
    AccountAction::IncrementIdentityAddressIndex
}

pub fn new_identity_address(keypair: IdentityKeypair) -> AccountAction {
    AccountAction::NewIdentityAddress { keypair }
}

pub fn update_viewed_recovery_code() -> AccountAction {
    AccountAction::ViewedRecoveryCode
}

// --- Reducer ---

/// Apply `action` to `state`.
pub fn reduce(state: &mut AccountState, action: AccountAction) {
    match action {
        AccountAction::CreateAccount {
            encrypted_backup_phrase,
            bitcoin_public_keychain,
            first_bitcoin_address,
            identity_public_keychain,
            identity_addresses,
            identity_keypairs,
        } => {
            state.account_created = true;
            state.encrypted_backup_phrase = Some(encrypted_backup_phrase);
            state.identity_account = IdentityAccount {
                public_keychain: Some(identity_public_keychain),
                addresses: identity_addresses,
                keypairs: identity_keypairs,
                address_index: 0,
            };
            state.bitcoin_account = BitcoinAccount {
                public_keychain: Some(bitcoin_public_keychain),
                addresses: vec![first_bitcoin_address],
                address_index: 0,
                balances: Balances::default(),
            };
        }
        AccountAction::DeleteAccount => {
            // Cached balances and Core wallet state outlive the account.
            let balances = std::mem::take(&mut state.bitcoin_account.balances);
            let core_wallet = std::mem::take(&mut state.core_wallet);
            *state = AccountState::default();
            state.bitcoin_account.balances = balances;
            state.core_wallet = core_wallet;
        }
        AccountAction::UpdateBackupPhrase {
            encrypted_backup_phrase,
        } => {
            state.encrypted_backup_phrase = Some(encrypted_backup_phrase);
        }
        AccountAction::NewBitcoinAddress => {
            let account = &mut state.bitcoin_account;
            let Some(xpub) = account.public_keychain.as_deref() else {
                warn!("new bitcoin address requested without a bitcoin keychain");
                return;
            };
            let next = account.address_index.saturating_add(1);
            match keys::bitcoin_address_at(xpub, next) {
                Ok(address) => {
                    account.addresses.push(address);
                    account.address_index = next;
                }
                Err(e) => warn!(error = %e, index = next, "could not derive bitcoin address"),
            }
        }
        AccountAction::NewIdentityAddress { keypair } => {
            state.identity_account.addresses.push(keypair.address.clone());
            state.identity_account.keypairs.push(keypair);
        }
        AccountAction::IncrementIdentityAddressIndex => {
            let index = &mut state.identity_account.address_index;
            *index = index.saturating_add(1);
        }
        AccountAction::UpdateBalances { balances } => {
            state.bitcoin_account.balances = balances;
        }
        AccountAction::UpdateCoreAddress {
            core_wallet_address,
        } => {
            state.core_wallet.address = Some(core_wallet_address);
            state.core_wallet.address_error = None;
        }
        AccountAction::UpdateCoreAddressError { error } => {
            state.core_wallet.address_error = Some(error);
        }
        AccountAction::UpdateCoreBalance {
            core_wallet_balance,
        } => {
            state.core_wallet.balance = core_wallet_balance;
        }
        AccountAction::ResetCoreBalanceWithdrawal => {
            state.core_wallet.withdrawal = Withdrawal::default();
        }
        AccountAction::WithdrawingCoreBalance {
            recipient_address,
            amount,
        } => {
            state.core_wallet.withdrawal = Withdrawal {
                in_progress: true,
                recipient_address: Some(recipient_address),
                amount,
                ..Withdrawal::default()
            };
        }
        AccountAction::WithdrawCoreBalanceSuccess => {
            let w = &mut state.core_wallet.withdrawal;
            w.in_progress = false;
            w.success = true;
            w.error = None;
        }
        AccountAction::WithdrawCoreBalanceError { error }
        | AccountAction::BuildTransactionError { error }
        | AccountAction::BroadcastTransactionError { error } => {
            let w = &mut state.core_wallet.withdrawal;
            w.in_progress = false;
            w.success = false;
            w.error = Some(error);
        }
        AccountAction::BuildTransaction => {
            state.core_wallet.withdrawal = Withdrawal {
                in_progress: true,
                ..Withdrawal::default()
            };
        }
        AccountAction::BuildTransactionSuccess { tx_hex } => {
            // Still in progress until the broadcast settles.
            state.core_wallet.withdrawal.tx_hex = Some(tx_hex);
        }
        AccountAction::BroadcastTransaction { tx_hex } => {
            let w = &mut state.core_wallet.withdrawal;
            w.in_progress = true;
            w.error = None;
            w.tx_hex = Some(tx_hex);
        }
        AccountAction::BroadcastTransactionSuccess { tx_hex } => {
            let w = &mut state.core_wallet.withdrawal;
            w.in_progress = false;
            w.success = true;
            w.tx_hex = Some(tx_hex);
        }
        AccountAction::PromptedForEmail { email } => {
            state.prompted_for_email = true;
            state.email = email;
        }
        AccountAction::ConnectedStorage => state.connected_storage = true,
        AccountAction::ViewedRecoveryCode => state.viewed_recovery_code = true,
        AccountAction::RecoveryCodeVerified => state.recovery_code_verified = true,
    }
}

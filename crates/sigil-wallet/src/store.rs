//! Where account actions go once they are produced.

use parking_lot::Mutex;

use crate::account::{reduce, AccountAction, AccountState};
use crate::error::WalletError;

/// Receives every action an operation emits, in emission order.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, action: AccountAction);
}

/// Holds the single [`AccountState`] and applies dispatched actions to it.
///
/// Each dispatch is applied under the lock, so concurrent dispatches
/// serialize. Ordering between two in-flight operations is last write wins.
#[derive(Debug, Default)]
pub struct AccountStore {
    state: Mutex<AccountState>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: AccountState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Restore a store from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let state: AccountState = serde_json::from_str(json)?;
        Ok(Self::from_state(state))
    }

    pub fn to_json(&self) -> Result<String, WalletError> {
        Ok(serde_json::to_string_pretty(&*self.state.lock())?)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> AccountState {
        self.state.lock().clone()
    }

    /// Read the state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&AccountState) -> R) -> R {
        f(&self.state.lock())
    }
}

impl Dispatcher for AccountStore {
    fn dispatch(&self, action: AccountAction) {
        reduce(&mut self.state.lock(), action);
    }
}

/// Records dispatched actions without applying them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    actions: Mutex<Vec<AccountAction>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<AccountAction> {
        self.actions.lock().clone()
    }

    pub fn take(&self) -> Vec<AccountAction> {
        std::mem::take(&mut *self.actions.lock())
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, action: AccountAction) {
        self.actions.lock().push(action);
    }
}

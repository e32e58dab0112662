//! Account file persistence.

use std::path::Path;

use anyhow::{Context, Result};
use sigil_wallet::AccountStore;

/// Load the account store, or start empty when the file does not exist yet.
pub fn load_store(path: &Path) -> Result<AccountStore> {
    if !path.exists() {
        return Ok(AccountStore::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read account file: {}", path.display()))?;
    AccountStore::from_json(&json)
        .with_context(|| format!("Account file is corrupted: {}", path.display()))
}

/// Write the account store, replacing the previous file in one rename.
pub fn save_store(path: &Path, store: &AccountStore) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = store.to_json().context("Failed to serialize account")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

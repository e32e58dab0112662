//! sigil-cli: command-line front end for the Sigil wallet.
//!
//! Creates, restores and inspects the seed-derived account, refreshes
//! balances, sends bitcoin and drives a local Core wallet. The account
//! record lives as JSON in the data directory; the backup phrase inside it
//! is always encrypted.

mod config;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use sigil_core::traits::HttpClient;
use sigil_net::{BitcoindNetwork, EsploraNetwork, ReqwestClient};
use sigil_wallet::account::{delete_account, new_bitcoin_address};
use sigil_wallet::core_api::{is_api_password_valid, is_core_running};
use sigil_wallet::mnemonic::normalize_phrase;
use sigil_wallet::{
    decrypt_backup_phrase, AccountActions, AccountState, AccountStore, Dispatcher, Encoding,
    MasterKeychain,
};

use crate::config::CliConfig;

/// Sigil command-line wallet.
#[derive(Parser)]
#[command(name = "sigil-cli")]
#[command(version, about = "Seed-derived identity and bitcoin wallet.")]
struct Cli {
    /// Account file (default: $SIGIL_DATA_DIR/account.json).
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account management subcommands.
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Refresh and show balances for every bitcoin address.
    Balance,
    /// Send bitcoin from one of the account's addresses.
    Send(SendArgs),
    /// Core wallet subcommands.
    Core {
        #[command(subcommand)]
        action: CoreCommand,
    },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Create a new account with a fresh backup phrase.
    Create,
    /// Restore an account from a backup phrase.
    Restore(RestoreArgs),
    /// Show the public account record.
    Show,
    /// Delete the account.
    Delete(DeleteArgs),
    /// Reveal the backup phrase.
    Phrase,
    /// Confirm the backup phrase was written down correctly.
    Verify,
    /// Derive the next identity keypair.
    NewIdentity,
    /// Mark the next unused identity as used; it must already be derived.
    UseIdentity,
    /// Derive the next bitcoin receive address.
    NewAddress,
    /// Sign up for backup reminder emails.
    Email(EmailArgs),
    /// Decline backup reminder emails.
    SkipEmail,
    /// Record that remote storage has been connected.
    ConnectStorage,
}

#[derive(Subcommand)]
enum CoreCommand {
    /// Check that the Core node is up and the API password works.
    Status,
    /// Show the Core wallet payment address.
    Address,
    /// Show the Core wallet balance.
    Balance,
    /// Withdraw from the Core wallet.
    Withdraw(WithdrawArgs),
}

#[derive(Args)]
struct RestoreArgs {
    /// Backup phrase. If not provided, will prompt securely.
    #[arg(short, long)]
    phrase: Option<String>,
}

#[derive(Args)]
struct DeleteArgs {
    /// Skip the confirmation check.
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct EmailArgs {
    /// Address to send reminders to.
    email: String,

    /// Also join the mailing list.
    #[arg(long)]
    opt_in: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount to send in BTC (e.g., 0.015).
    #[arg(short, long)]
    amount: f64,

    /// Index of the bitcoin address to spend from.
    #[arg(short, long, default_value = "0")]
    index: u32,

    /// Use the local regtest chain.
    #[arg(long)]
    regtest: bool,
}

#[derive(Args)]
struct WithdrawArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in satoshis (default: entire balance).
    #[arg(short, long)]
    amount: Option<u64>,

    /// Payment key for the Core wallet to spend with.
    #[arg(long)]
    payment_key: Option<String>,
}

/// Everything a command needs: config, the loaded store and wired actions.
struct App {
    config: CliConfig,
    path: PathBuf,
    store: Arc<AccountStore>,
    actions: AccountActions,
}

impl App {
    fn load(file: Option<PathBuf>) -> Result<Self> {
        let config = CliConfig::from_env()?;
        let path = file.unwrap_or_else(|| config.account_path());
        let store = Arc::new(storage::load_store(&path)?);
        let actions = build_actions(&config, store.clone())?;
        debug!(path = %path.display(), "account loaded");
        Ok(Self {
            config,
            path,
            store,
            actions,
        })
    }

    fn state(&self) -> AccountState {
        self.store.snapshot()
    }

    fn save(&self) -> Result<()> {
        storage::save_store(&self.path, &self.store)
    }

    fn require_account(&self) -> Result<AccountState> {
        let state = self.state();
        if !state.account_created {
            bail!("No account found at {}. Run `sigil-cli account create` first.", self.path.display());
        }
        Ok(state)
    }

    fn encrypted_phrase(&self) -> Result<String> {
        self.require_account()?
            .encrypted_backup_phrase
            .context("Account has no backup phrase")
    }
}

fn build_actions(config: &CliConfig, store: Arc<AccountStore>) -> Result<AccountActions> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
    let mainnet = Arc::new(EsploraNetwork::new(
        http.clone(),
        &config.esplora_url,
        config.mainnet_settings(),
    ));
    let regtest = Arc::new(BitcoindNetwork::new(
        &config.bitcoind_url,
        &config.bitcoind_user,
        &config.bitcoind_password,
        config.regtest_settings(),
    )?);
    Ok(AccountActions::new(http, mainnet, store)
        .with_regtest_network(regtest)
        .with_policy(Arc::new(config.endpoint_policy()))
        .with_urls(config.service_urls()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app = App::load(cli.file)?;

    match cli.command {
        Commands::Account { action } => match action {
            AccountCommand::Create => account_create(&app),
            AccountCommand::Restore(args) => account_restore(&app, args),
            AccountCommand::Show => account_show(&app),
            AccountCommand::Delete(args) => account_delete(&app, args),
            AccountCommand::Phrase => account_phrase(&app),
            AccountCommand::Verify => account_verify(&app),
            AccountCommand::NewIdentity => account_new_identity(&app),
            AccountCommand::UseIdentity => account_use_identity(&app),
            AccountCommand::NewAddress => account_new_address(&app),
            AccountCommand::Email(args) => account_email(&app, args).await,
            AccountCommand::SkipEmail => {
                app.actions.skip_email_backup();
                app.save()
            }
            AccountCommand::ConnectStorage => {
                app.actions.storage_is_connected();
                app.save()
            }
        },
        Commands::Balance => balance(&app).await,
        Commands::Send(args) => send(&app, args).await,
        Commands::Core { action } => match action {
            CoreCommand::Status => core_status(&app).await,
            CoreCommand::Address => core_address(&app).await,
            CoreCommand::Balance => core_balance(&app).await,
            CoreCommand::Withdraw(args) => core_withdraw(&app, args).await,
        },
    }
}

/// Create a new account and show its backup phrase once.
fn account_create(app: &App) -> Result<()> {
    if app.state().account_created {
        bail!("An account already exists at {}", app.path.display());
    }
    let password = prompt_new_password()?;
    app.actions
        .initialize_wallet(&password, None)
        .context("Failed to create account")?;

    let phrase = decrypt_backup_phrase(&app.encrypted_phrase()?, &password, Encoding::Hex)?;
    app.actions.displayed_recovery_code();
    app.save()?;

    let state = app.state();
    println!("\n=== ACCOUNT CREATED ===");
    println!("\nBACKUP PHRASE (24 WORDS):");
    println!("  {}", phrase.as_str());
    println!("\nWrite it down. Anyone with this phrase controls the account.");
    println!("\nFirst bitcoin address: {}", state.first_bitcoin_address().unwrap_or("-"));
    println!("Saved to: {}", app.path.display());
    Ok(())
}

/// Restore (or overwrite) the account from a backup phrase.
fn account_restore(app: &App, args: RestoreArgs) -> Result<()> {
    let phrase = match args.phrase {
        Some(p) => p,
        None => prompt_password("Enter backup phrase")?,
    };
    let password = prompt_new_password()?;
    app.actions
        .initialize_wallet(&password, Some(&phrase))
        .context("Failed to restore account")?;
    app.save()?;

    println!("\n=== ACCOUNT RESTORED ===");
    println!("First bitcoin address: {}", app.state().first_bitcoin_address().unwrap_or("-"));
    println!("Saved to: {}", app.path.display());
    Ok(())
}

fn account_show(app: &App) -> Result<()> {
    let state = app.require_account()?;
    let summary = serde_json::json!({
        "identityPublicKeychain": state.identity_account.public_keychain,
        "identityAddresses": state.identity_account.addresses,
        "identityAddressIndex": state.identity_account.address_index,
        "bitcoinPublicKeychain": state.bitcoin_account.public_keychain,
        "bitcoinAddresses": state.bitcoin_account.addresses,
        "balances": state.bitcoin_account.balances,
        "coreWallet": {
            "address": state.core_wallet.address,
            "balance": state.core_wallet.balance,
        },
        "promptedForEmail": state.prompted_for_email,
        "viewedRecoveryCode": state.viewed_recovery_code,
        "recoveryCodeVerified": state.recovery_code_verified,
        "connectedStorage": state.connected_storage,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn account_delete(app: &App, args: DeleteArgs) -> Result<()> {
    app.require_account()?;
    if !args.yes {
        let answer = prompt_password("Type DELETE to remove the account")?;
        if answer.trim() != "DELETE" {
            bail!("Aborted");
        }
    }
    app.store.dispatch(delete_account());
    app.save()?;
    println!("Account deleted. Refresh balances before relying on cached values.");
    Ok(())
}

fn account_phrase(app: &App) -> Result<()> {
    let encrypted = app.encrypted_phrase()?;
    let password = prompt_password("Account password")?;
    let phrase = decrypt_backup_phrase(&encrypted, &password, Encoding::Hex)
        .context("Failed to decrypt backup phrase (check password)")?;
    app.actions.displayed_recovery_code();
    app.save()?;
    println!("{}", phrase.as_str());
    Ok(())
}

fn account_verify(app: &App) -> Result<()> {
    let encrypted = app.encrypted_phrase()?;
    let password = prompt_password("Account password")?;
    let phrase = decrypt_backup_phrase(&encrypted, &password, Encoding::Hex)
        .context("Failed to decrypt backup phrase (check password)")?;
    let typed = prompt_password("Type your backup phrase")?;
    if normalize_phrase(&typed) != normalize_phrase(&phrase) {
        bail!("Backup phrase does not match");
    }
    app.actions.do_verify_recovery_code();
    app.save()?;
    println!("Backup phrase verified.");
    Ok(())
}

/// Index the next `new-identity` derives at.
///
/// Keypairs are append-only and `keypairs[i]` is always identity `i`, so this
/// is one past the last derived keypair regardless of the cursor.
fn next_identity_index(state: &AccountState) -> Result<u32> {
    u32::try_from(state.identity_account.keypairs.len()).context("Too many identities")
}

/// Check that the identity under the cursor exists before `use-identity`
/// marks it used.
///
/// `address_index` is the next unused identity and never passes the derived
/// keypairs: once every keypair is used it equals `next_identity_index`.
fn unused_identity_index(state: &AccountState) -> Result<u32> {
    let cursor = state.identity_account.address_index;
    if cursor >= next_identity_index(state)? {
        bail!("Identity {cursor} has not been derived yet; run `account new-identity` first");
    }
    Ok(cursor)
}

fn account_new_identity(app: &App) -> Result<()> {
    let state = app.require_account()?;
    let encrypted = app.encrypted_phrase()?;
    let password = prompt_password("Account password")?;
    let index = next_identity_index(&state)?;
    app.actions
        .new_identity_address(&encrypted, &password, index)
        .context("Failed to derive identity (check password)")?;
    app.save()?;

    let address = app
        .state()
        .identity_account
        .addresses
        .last()
        .cloned()
        .unwrap_or_default();
    println!("Identity {index}: {address}");
    Ok(())
}

fn account_use_identity(app: &App) -> Result<()> {
    let state = app.require_account()?;
    let used = unused_identity_index(&state)?;
    app.actions.used_identity_address();
    app.save()?;
    println!(
        "Identity {used} marked used. Identity address index: {}",
        app.state().identity_account.address_index
    );
    Ok(())
}

fn account_new_address(app: &App) -> Result<()> {
    let before = app.require_account()?.bitcoin_account.addresses.len();
    app.store.dispatch(new_bitcoin_address());
    let state = app.state();
    if state.bitcoin_account.addresses.len() == before {
        bail!("Could not derive a new bitcoin address");
    }
    app.save()?;
    println!(
        "{}",
        state.bitcoin_account.addresses.last().map(String::as_str).unwrap_or_default()
    );
    Ok(())
}

async fn account_email(app: &App, args: EmailArgs) -> Result<()> {
    app.actions.email_notifications(&args.email, args.opt_in).await;
    app.save()?;
    println!("Email recorded: {}", args.email);
    Ok(())
}

/// Refresh and display balances for every derived bitcoin address.
async fn balance(app: &App) -> Result<()> {
    let addresses = app.require_account()?.bitcoin_account.addresses;
    let before = app.state().bitcoin_account.balances;
    app.actions
        .refresh_balances(&app.config.balance_url, &addresses)
        .await;
    let balances = app.state().bitcoin_account.balances;
    if balances == before && !addresses.is_empty() {
        println!("(balance service unavailable, showing cached balances)");
    }
    app.save()?;

    for address in &addresses {
        let btc = balances.by_address.get(address).copied().unwrap_or(0.0);
        println!("{address}  {btc:.8} BTC");
    }
    println!("Total: {:.8} BTC", balances.total);
    Ok(())
}

/// Build, sign and broadcast a spend from bitcoin address `index`.
async fn send(app: &App, args: SendArgs) -> Result<()> {
    if args.amount <= 0.0 {
        bail!("Amount must be greater than zero");
    }
    let encrypted = app.encrypted_phrase()?;
    let password = prompt_password("Account password")?;
    let phrase = decrypt_backup_phrase(&encrypted, &password, Encoding::Hex)
        .context("Failed to decrypt backup phrase (check password)")?;
    let master = MasterKeychain::from_phrase(&phrase)?;
    let payment_key = master.payment_key(args.index)?.to_wif();

    let result = app
        .actions
        .send_bitcoin(args.regtest, &payment_key, &args.to, args.amount)
        .await;
    app.save()?;
    let confirmation = result.context("Send failed")?;

    println!("\n=== TRANSACTION SENT ===");
    println!("TxID: {confirmation}");
    println!("To: {}", args.to);
    println!("Amount: {:.8} BTC", args.amount);
    Ok(())
}

async fn core_status(app: &App) -> Result<()> {
    let http = ReqwestClient::new()?;
    let policy = app.config.endpoint_policy();
    let urls = app.actions.urls();

    if !is_core_running(&http, &policy, &urls.core_ping_url).await {
        bail!("Core node is not responding at {}", app.config.core_api_url);
    }
    println!("Core node: running");

    if app.config.webapp_build {
        return Ok(());
    }
    let password = prompt_password("Core API password")?;
    match is_api_password_valid(&http, &policy, &urls.core_password_protected_read_url, &password).await {
        Some(true) => println!("API password: valid"),
        Some(false) => bail!("API password was rejected"),
        None => bail!("Could not reach the Core API to check the password"),
    }
    Ok(())
}

async fn core_address(app: &App) -> Result<()> {
    let url = app.actions.urls().wallet_payment_address_url.clone();
    if app.config.webapp_build {
        println!("Core wallet is not available in the web-app build.");
        return Ok(());
    }
    let password = prompt_password("Core API password")?;
    app.actions.get_core_wallet_address(&url, &password).await;
    app.save()?;

    let core = app.state().core_wallet;
    match (core.address, core.address_error) {
        (_, Some(error)) => bail!("Core wallet address lookup failed: {error}"),
        (Some(address), None) => println!("{address}"),
        (None, None) => println!("-"),
    }
    Ok(())
}

async fn core_balance(app: &App) -> Result<()> {
    let url = app.actions.urls().core_wallet_balance_url.clone();
    let password = if app.config.webapp_build {
        String::new()
    } else {
        prompt_password("Core API password")?
    };
    app.actions.refresh_core_wallet_balance(&url, &password).await;
    app.save()?;
    println!("{:.8} BTC", app.state().core_wallet.balance);
    Ok(())
}

async fn core_withdraw(app: &App, args: WithdrawArgs) -> Result<()> {
    let url = app.actions.urls().core_wallet_withdraw_url.clone();
    let password = if app.config.webapp_build {
        String::new()
    } else {
        prompt_password("Core API password")?
    };
    app.actions.reset_core_withdrawal();
    app.actions
        .withdraw_bitcoin_from_core_wallet(&url, &args.to, &password, args.amount, args.payment_key.as_deref())
        .await;
    app.save()?;

    let withdrawal = app.state().core_wallet.withdrawal;
    if let Some(error) = withdrawal.error {
        bail!("Withdrawal failed: {error}");
    }
    println!("Withdrawal to {} sent.", args.to);
    Ok(())
}

/// Prompt for a password securely (no echo).
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read password")
}

/// Prompt for a new password twice and require a match.
fn prompt_new_password() -> Result<String> {
    let password = prompt_password("Enter account password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

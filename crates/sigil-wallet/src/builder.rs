//! Signed P2PKH spend construction.
//!
//! Building a spend happens in three steps:
//! 1. Fetch UTXOs for the payment address and a fee rate from the network
//! 2. Plan the spend (coin selection, fee, change)
//! 3. Assemble the transaction and sign every input with SIGHASH_ALL

use std::fmt;
use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::{Builder as ScriptBuilder, PushBytesBuf, ScriptBuf};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, EcdsaSighashType, Network, OutPoint, PrivateKey, PublicKey, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use tracing::{debug, warn};

use sigil_core::constants::FALLBACK_FEE_RATE;
use sigil_core::traits::BitcoinNetwork;
use sigil_core::types::Utxo;

use crate::coin_selection::{CoinSelector, SpendPlan};
use crate::error::WalletError;

/// Private key that funds a spend.
///
/// Accepts WIF, or 32-byte hex with an optional trailing `01`
/// compression flag.
#[derive(Clone)]
pub struct PaymentKey {
    key: PrivateKey,
}

impl PaymentKey {
    pub fn parse(text: &str) -> Result<Self, WalletError> {
        let text = text.trim();
        if let Ok(key) = PrivateKey::from_wif(text) {
            return Ok(Self { key });
        }

        let bytes = hex::decode(text)
            .map_err(|_| WalletError::InvalidPaymentKey("expected WIF or hex".into()))?;
        let (secret, compressed) = match bytes.len() {
            32 => (&bytes[..], false),
            33 if bytes[32] == 0x01 => (&bytes[..32], true),
            n => {
                return Err(WalletError::InvalidPaymentKey(format!(
                    "expected 32 or 33 bytes, got {n}"
                )));
            }
        };
        let inner = SecretKey::from_slice(secret)
            .map_err(|e| WalletError::InvalidPaymentKey(e.to_string()))?;
        let key = if compressed {
            PrivateKey::new(inner, Network::Bitcoin)
        } else {
            PrivateKey::new_uncompressed(inner, Network::Bitcoin)
        };
        Ok(Self { key })
    }

    pub fn from_private_key(key: PrivateKey) -> Self {
        Self { key }
    }

    pub fn to_wif(&self) -> String {
        self.key.to_wif()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        PublicKey::from_private_key(&secp, &self.key)
    }

    /// The P2PKH address this key spends from on `network`.
    pub fn address(&self, network: Network) -> Address {
        Address::p2pkh(self.public_key(), network)
    }
}

impl fmt::Debug for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentKey")
            .field("key", &"[REDACTED]")
            .field("compressed", &self.key.compressed)
            .finish()
    }
}

/// A transfer moving through the build and broadcast pipeline. Never persisted.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub recipient_address: String,
    pub amount_satoshis: u64,
    pub payment_key: PaymentKey,
    pub built_hex: Option<String>,
    pub broadcast_result: Option<String>,
}

impl PendingTransaction {
    pub fn new(recipient_address: impl Into<String>, amount_satoshis: u64, payment_key: PaymentKey) -> Self {
        Self {
            recipient_address: recipient_address.into(),
            amount_satoshis,
            payment_key,
            built_hex: None,
            broadcast_result: None,
        }
    }
}

/// A fully signed spend.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    /// Consensus-serialized transaction, hex.
    pub hex: String,
    pub plan: SpendPlan,
}

impl SignedTransaction {
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }
}

/// Builds signed spends against an injected [`BitcoinNetwork`].
pub struct TransactionBuilder<'a> {
    network: &'a dyn BitcoinNetwork,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(network: &'a dyn BitcoinNetwork) -> Self {
        Self { network }
    }

    /// Build a signed spend of `amount` satoshis to `recipient`.
    ///
    /// The recipient must already be encoded for this network; regtest
    /// callers coerce it first.
    pub async fn build(
        &self,
        recipient: &str,
        key: &PaymentKey,
        amount: u64,
    ) -> Result<SignedTransaction, WalletError> {
        let chain = self.network.settings().bitcoin_network();
        let recipient = parse_address(recipient, chain)?;
        let from = key.address(chain);

        let utxos = self.network.get_utxos(&from.to_string()).await?;
        let fee_rate = match self.network.get_fee_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_FEE_RATE, "fee estimate unavailable");
                FALLBACK_FEE_RATE
            }
        };
        debug!(utxos = utxos.len(), fee_rate, amount, "planning spend");

        let plan = CoinSelector::select(&utxos, amount, fee_rate)?;
        sign_spend(plan, &recipient, &from, key)
    }

    /// Push a signed transaction to the network.
    pub async fn broadcast(&self, tx_hex: &str) -> Result<String, WalletError> {
        self.network
            .broadcast_transaction(tx_hex)
            .await
            .map_err(|e| WalletError::Broadcast(e.to_string()))
    }

    /// Run a [`PendingTransaction`] through build and broadcast, filling in its results.
    pub async fn send(&self, pending: &mut PendingTransaction) -> Result<String, WalletError> {
        let signed = self
            .build(&pending.recipient_address, &pending.payment_key, pending.amount_satoshis)
            .await?;
        pending.built_hex = Some(signed.hex.clone());
        let result = self.broadcast(&signed.hex).await?;
        pending.broadcast_result = Some(result.clone());
        Ok(result)
    }
}

/// Assemble and sign the transaction described by `plan`.
///
/// Every input is spent from `from`, the key's P2PKH address, which also
/// receives any change. Output 0 pays the recipient.
pub fn sign_spend(
    plan: SpendPlan,
    recipient: &Address,
    from: &Address,
    key: &PaymentKey,
) -> Result<SignedTransaction, WalletError> {
    let mut input = Vec::with_capacity(plan.selected.len());
    for utxo in &plan.selected {
        input.push(TxIn {
            previous_output: outpoint(utxo)?,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        });
    }

    let mut output = vec![TxOut {
        value: Amount::from_sat(plan.recipient_value),
        script_pubkey: recipient.script_pubkey(),
    }];
    if let Some(change) = plan.change {
        output.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: from.script_pubkey(),
        });
    }

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input,
        output,
    };

    let secp = Secp256k1::signing_only();
    let public_key = key.public_key();
    let spent_script = from.script_pubkey();
    let sighash_type = EcdsaSighashType::All;

    // All sighashes are taken over the unsigned transaction.
    let sighashes = {
        let cache = SighashCache::new(&tx);
        (0..tx.input.len())
            .map(|i| {
                cache
                    .legacy_signature_hash(i, &spent_script, sighash_type.to_u32())
                    .map_err(|e| WalletError::TransactionBuild(format!("sighash: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let pubkey_push = PushBytesBuf::try_from(public_key.to_bytes())
        .map_err(|e| WalletError::TransactionBuild(format!("pubkey push: {e}")))?;
    for (txin, sighash) in tx.input.iter_mut().zip(sighashes) {
        let msg = Message::from_digest(sighash.to_byte_array());
        let sig = secp.sign_ecdsa(&msg, &key.key.inner);

        let mut sig_bytes = sig.serialize_der().to_vec();
        sig_bytes.push(sighash_type.to_u32() as u8);
        let sig_push = PushBytesBuf::try_from(sig_bytes)
            .map_err(|e| WalletError::TransactionBuild(format!("signature push: {e}")))?;

        txin.script_sig = ScriptBuilder::new()
            .push_slice(&sig_push)
            .push_slice(&pubkey_push)
            .into_script();
    }

    let hex = bitcoin::consensus::encode::serialize_hex(&tx);
    Ok(SignedTransaction { tx, hex, plan })
}

/// Parse an address and check it belongs to `network`.
pub fn parse_address(text: &str, network: Network) -> Result<Address, WalletError> {
    Address::from_str(text.trim())
        .map_err(|e| WalletError::InvalidAddress(format!("{text}: {e}")))?
        .require_network(network)
        .map_err(|e| WalletError::InvalidAddress(format!("{text}: {e}")))
}

fn outpoint(utxo: &Utxo) -> Result<OutPoint, WalletError> {
    let txid = Txid::from_str(&utxo.txid)
        .map_err(|e| WalletError::TransactionBuild(format!("invalid txid {}: {e}", utxo.txid)))?;
    Ok(OutPoint::new(txid, utxo.vout))
}

//! Coin selection and fee planning for single-recipient spends.
//!
//! Fees are paid out of the amount being sent, not on top of it. Selection
//! prefers the smallest single UTXO that covers what is still owed, and
//! otherwise takes the largest one and keeps going. When the address cannot
//! fund the full amount the plan sweeps everything it has.

use sigil_core::constants::{DUST_MINIMUM, P2PKH_INPUT_BYTES, P2PKH_OUTPUT_BYTES, TX_OVERHEAD_BYTES};
use sigil_core::types::Utxo;

use crate::error::WalletError;

/// Result of coin selection: which UTXOs to spend and where the value goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    /// Selected UTXOs, in spend order.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs.
    pub total_in: u64,
    /// Amount funded for the recipient before fees. Less than the request on a sweep.
    pub funded: u64,
    /// Value of the recipient output (`funded - fee`).
    pub recipient_value: u64,
    /// Value of the change output, if one is worth creating.
    pub change: Option<u64>,
    /// Transaction fee in satoshis.
    pub fee: u64,
}

impl SpendPlan {
    /// Whether the address could not fund the requested amount.
    pub fn is_sweep(&self, requested: u64) -> bool {
        self.funded < requested
    }
}

/// Estimated serialized size of a legacy P2PKH transaction.
pub fn estimate_tx_bytes(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES
        .saturating_add(P2PKH_INPUT_BYTES.saturating_mul(inputs as u64))
        .saturating_add(P2PKH_OUTPUT_BYTES.saturating_mul(outputs as u64))
}

/// Smallest-sufficient-else-largest coin selector.
pub struct CoinSelector;

impl CoinSelector {
    /// Plan a spend of `amount` satoshis at `fee_rate` sat/byte.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] when there is nothing
    /// to spend, and with [`WalletError::InvalidAmount`] when the recipient
    /// output would fall below the dust minimum once fees are paid.
    pub fn select(utxos: &[Utxo], amount: u64, fee_rate: u64) -> Result<SpendPlan, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }
        let available: u64 = utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.value));
        if available == 0 {
            return Err(WalletError::InsufficientFunds {
                have: 0,
                need: amount,
            });
        }

        let mut remaining: Vec<&Utxo> = utxos.iter().filter(|u| u.value > 0).collect();
        // Ascending by value, ties broken by outpoint so plans are reproducible.
        remaining.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.txid.cmp(&b.txid))
                .then_with(|| a.vout.cmp(&b.vout))
        });

        let mut selected = Vec::new();
        let mut total_in: u64 = 0;
        let mut left_to_fund = amount;

        while left_to_fund > 0 && !remaining.is_empty() {
            let pick = match remaining.iter().position(|u| u.value >= left_to_fund) {
                Some(smallest_sufficient) => smallest_sufficient,
                None => remaining.len() - 1,
            };
            let utxo = remaining.remove(pick);
            total_in = total_in.saturating_add(utxo.value);
            left_to_fund = left_to_fund.saturating_sub(utxo.value);
            selected.push(utxo.clone());
        }

        let funded = amount - left_to_fund;
        let change_value = total_in - funded;

        let mut fee = fee_rate.saturating_mul(estimate_tx_bytes(selected.len(), 1));
        let fee_for_change = fee_rate.saturating_mul(P2PKH_OUTPUT_BYTES);
        let change = if change_value > fee_for_change {
            fee = fee.saturating_add(fee_for_change);
            Some(change_value)
        } else {
            None
        };

        let recipient_value = funded.saturating_sub(fee);
        if recipient_value < DUST_MINIMUM {
            return Err(WalletError::InvalidAmount(format!(
                "amount {funded} cannot cover fee {fee} and leave at least {DUST_MINIMUM} satoshis"
            )));
        }

        Ok(SpendPlan {
            selected,
            total_in,
            funded,
            recipient_value,
            change,
            fee,
        })
    }
}

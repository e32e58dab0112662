//! Conversions between BTC display amounts and integer satoshis.
//!
//! Balances are shown to users as floating-point BTC but every transaction
//! field is an integer number of satoshis. Conversion to satoshis rounds to
//! the nearest satoshi so that decimal inputs such as `0.29` (which is not
//! exactly representable) land on the satoshi the user typed.

use crate::constants::COIN;
use crate::error::AmountError;

/// Convert a BTC amount to satoshis.
///
/// # Examples
///
/// ```
/// use sigil_core::amount::btc_to_satoshis;
/// assert_eq!(btc_to_satoshis(1.0).unwrap(), 100_000_000);
/// assert_eq!(btc_to_satoshis(0.29).unwrap(), 29_000_000);
/// ```
pub fn btc_to_satoshis(btc: f64) -> Result<u64, AmountError> {
    if !btc.is_finite() {
        return Err(AmountError::NotFinite);
    }
    if btc < 0.0 {
        return Err(AmountError::Negative);
    }
    let sats = (btc * COIN as f64).round();
    if sats >= u64::MAX as f64 {
        return Err(AmountError::Overflow);
    }
    Ok(sats as u64)
}

/// Convert satoshis to a BTC display amount.
pub fn satoshis_to_btc(satoshis: u64) -> f64 {
    satoshis as f64 / COIN as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_btc_is_one_coin() {
        assert_eq!(btc_to_satoshis(1.0).unwrap(), COIN);
    }

    #[test]
    fn one_satoshi() {
        assert_eq!(btc_to_satoshis(0.000_000_01).unwrap(), 1);
    }

    #[test]
    fn inexact_decimal_rounds_to_intended_satoshi() {
        assert_eq!(btc_to_satoshis(0.29).unwrap(), 29_000_000);
        assert_eq!(btc_to_satoshis(1.1).unwrap(), 110_000_000);
    }

    #[test]
    fn zero_is_allowed() {
        assert_eq!(btc_to_satoshis(0.0).unwrap(), 0);
    }

    #[test]
    fn negative_rejected() {
        assert_eq!(btc_to_satoshis(-0.5).unwrap_err(), AmountError::Negative);
    }

    #[test]
    fn nan_and_infinity_rejected() {
        assert_eq!(btc_to_satoshis(f64::NAN).unwrap_err(), AmountError::NotFinite);
        assert_eq!(
            btc_to_satoshis(f64::INFINITY).unwrap_err(),
            AmountError::NotFinite
        );
    }

    #[test]
    fn overflow_rejected() {
        assert_eq!(btc_to_satoshis(1e12).unwrap_err(), AmountError::Overflow);
    }

    #[test]
    fn satoshis_to_btc_divides_by_coin() {
        assert_eq!(satoshis_to_btc(199_999_999), 1.99999999);
        assert_eq!(satoshis_to_btc(0), 0.0);
    }

    proptest::proptest! {
        #[test]
        fn display_amount_converts_back_exactly(sats in 0u64..1_000_000 * COIN) {
            proptest::prop_assert_eq!(btc_to_satoshis(satoshis_to_btc(sats)).unwrap(), sats);
        }
    }
}

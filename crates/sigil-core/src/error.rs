//! Error types shared across the Sigil crates.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is negative")] Negative,
    #[error("amount is not a finite number")] NotFinite,
    #[error("amount overflows u64 satoshis")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 address: {0}")] InvalidBase58(String),
    #[error("unsupported address version: {0:#04x}")] UnsupportedVersion(u8),
    #[error("address is not valid for network {0}")] WrongNetwork(String),
}

/// A failed HTTP exchange. Carries only the message; transports differ too much
/// to keep their concrete error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")] Request { url: String, message: String },
    #[error("{url} returned status {status}")] Status { url: String, status: u16 },
    #[error("unexpected response body: {0}")] Body(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("utxo lookup failed: {0}")] Utxos(String),
    #[error("fee estimate failed: {0}")] FeeRate(String),
    #[error("broadcast rejected: {0}")] Broadcast(String),
    #[error(transparent)] Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum SigilError {
    #[error(transparent)] Amount(#[from] AmountError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Fetch(#[from] FetchError),
    #[error(transparent)] Network(#[from] NetworkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_display() {
        let e = FetchError::Status {
            url: "http://x/".into(),
            status: 503,
        };
        assert_eq!(e.to_string(), "http://x/ returned status 503");
    }

    #[test]
    fn network_error_wraps_fetch() {
        let fetch = FetchError::Body("bad".into());
        let net: NetworkError = fetch.clone().into();
        assert_eq!(net, NetworkError::Fetch(fetch));
        assert_eq!(net.to_string(), "unexpected response body: bad");
    }

    #[test]
    fn sigil_error_is_transparent() {
        let e: SigilError = AmountError::Negative.into();
        assert_eq!(e.to_string(), "amount is negative");
    }
}

//! Error types for the opengateway-rs library.
//!
//! Input problems are reported before any network call is made. Ledger
//! problems are kept distinct from a legitimate "not yet final" answer so a
//! caller never mistakes an outage for a pending payment.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding
    #[error("Base64 error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Error parsing URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// The ledger could not be reached or did not answer
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The gateway contract rejected the call
    #[error("Contract reverted: {0}")]
    ContractReverted(String),

    /// A submitted transaction disappeared from the mempool without a receipt
    #[error("Transaction dropped: {0}")]
    TransactionDropped(String),

    /// A state-changing call was attempted on a read-only ledger
    #[error("Signer required for {0}")]
    SignerRequired(&'static str),

    /// Invalid payment request payload
    #[error("Invalid payment payload: {0}")]
    InvalidPayload(String),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid payment identifier
    #[error("Invalid payment id: {0}")]
    InvalidPaymentId(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// Returns true if the error came from the ledger rather than from the
    /// caller's input.
    pub fn is_ledger_error(&self) -> bool {
        matches!(
            self,
            GatewayError::LedgerUnavailable(_)
                | GatewayError::ContractReverted(_)
                | GatewayError::TransactionDropped(_)
        )
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<ethers::providers::ProviderError> for GatewayError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        GatewayError::LedgerUnavailable(err.to_string())
    }
}

impl<M: ethers::providers::Middleware> From<ethers::contract::ContractError<M>> for GatewayError {
    fn from(err: ethers::contract::ContractError<M>) -> Self {
        if err.is_revert() {
            GatewayError::ContractReverted(err.to_string())
        } else {
            GatewayError::LedgerUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::InvalidAmount("zero".to_string());
        assert_eq!(err.to_string(), "Invalid amount: zero");

        let err = GatewayError::SignerRequired("payment submission");
        assert_eq!(err.to_string(), "Signer required for payment submission");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::JsonError(_)));

        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: GatewayError = url_err.into();
        assert!(matches!(err, GatewayError::UrlParseError(_)));
    }

    #[test]
    fn test_ledger_error_classification() {
        assert!(GatewayError::LedgerUnavailable("timeout".into()).is_ledger_error());
        assert!(GatewayError::ContractReverted("dup".into()).is_ledger_error());
        assert!(!GatewayError::InvalidAddress("0x".into()).is_ledger_error());
    }

    #[test]
    fn test_provider_error_is_unavailable() {
        let err: GatewayError =
            ethers::providers::ProviderError::CustomError("connection refused".into()).into();
        assert!(matches!(err, GatewayError::LedgerUnavailable(_)));
    }
}

//! # opengateway-rs
//!
//! A Rust client for OpenGateway, an on-chain payment gateway for EVM chains.
//!
//! The gateway contract records payments under caller-chosen 32-byte
//! identifiers and reports, for any identifier, the stored payment and the
//! current block. This crate covers the client side of that exchange:
//!
//! - **Payment identifiers**: unpredictable Keccak-256 identifiers derived from
//!   the payment parameters, an application namespace salt and fresh
//!   randomness ([`payment_id`])
//! - **Confirmation verification**: deciding whether a recorded payment has
//!   reached the required confirmation depth ([`verifier`])
//! - **Ledger access**: an async [`ledger::Ledger`] trait with an ethers-backed
//!   implementation for deployed gateways and an in-memory one for tests
//! - **Client facade**: [`client::GatewayClient`] tying the pieces together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ethers::types::U256;
//! use opengateway_rs::client::{GatewayClient, GatewayClientConfig};
//! use opengateway_rs::types::PrePaymentParams;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayClientConfig::new(
//!     "https://mainnet.base.org",
//!     "0x4242424242424242424242424242424242424242".parse()?,
//! )
//! .with_namespace_salt("app-1")
//! .with_signer_key("0xYOUR_PRIVATE_KEY");
//!
//! let client = GatewayClient::connect(config).await?;
//!
//! let params = client.create_payment(PrePaymentParams::parse(
//!     "1000",
//!     "native",
//!     "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
//!     "order-42",
//! )?);
//! client.submit_payment(&params).await?;
//!
//! if client.verify_payment(params.payment_id()).await? {
//!     println!("payment {} is final", params.payment_id());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Finality
//!
//! A payment is final once the gateway has processed it and at least `d`
//! blocks have passed since its payment block, where `d` is the confirmation
//! depth. `d` comes from the gateway contract unless the client fixes it
//! locally, in which case the fixed value always wins.
//!
//! Unknown identifiers are reported as not final rather than as errors.
//! Ledger failures are always returned as errors.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod errors;
pub mod ledger;
pub mod payment_id;
pub mod types;
pub mod utils;
pub mod verifier;

// Re-export commonly used items
pub use client::{GatewayClient, GatewayClientConfig};
pub use errors::{GatewayError, Result};
pub use ledger::{EvmLedger, Ledger, MemoryLedger};
pub use payment_id::{create_payment, generate_payment_id};
pub use types::{
    ConfirmationPolicy, ConfirmationStatus, PaymentId, PaymentParams, PaymentRecord,
    PermitSignature, PrePaymentParams, SubmissionReceipt, TokenType, NATIVE_TOKEN,
};
pub use verifier::ConfirmationVerifier;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_token_is_zero_address() {
        assert!(NATIVE_TOKEN.is_zero());
    }

    #[test]
    fn test_module_accessibility() {
        // Ensure all modules are accessible
        let _ = GatewayClientConfig::new("http://localhost:8545", NATIVE_TOKEN);
        let _ = MemoryLedger::new();
        let _ = EvmLedger::connect("http://localhost:8545").unwrap();
        let _ = ConfirmationPolicy::default();
    }
}

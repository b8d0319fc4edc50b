//! Ledger capability.
//!
//! The ledger is the system of record for payments: it accepts a payment under
//! an identifier and later reports the payment record together with its
//! current position (block height). This module contains the trait and two
//! implementations: [`EvmLedger`] for a deployed OpenGateway contract and
//! [`MemoryLedger`] for tests and local development.

pub mod evm;
pub mod memory;

pub use evm::EvmLedger;
pub use memory::MemoryLedger;

use crate::errors::Result;
use crate::types::{PaymentId, PaymentParams, PaymentRecord, SubmissionReceipt};
use async_trait::async_trait;
use ethers::types::Address;

/// Operations the client needs from a payment gateway.
///
/// Every method takes the gateway address, so one ledger handle can serve
/// several gateways. Implementations must be safe to share between
/// concurrent tasks; all query methods are read-only.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Hands a payment to the gateway under its identifier.
    ///
    /// # Returns
    ///
    /// A receipt naming the identifier and, for chains, the transaction.
    async fn submit_payment(
        &self,
        gateway: Address,
        params: &PaymentParams,
    ) -> Result<SubmissionReceipt>;

    /// Returns the payment stored under `payment_id` together with the
    /// ledger's current position.
    ///
    /// An identifier the gateway has never seen yields
    /// [`PaymentRecord::not_found`], not an error.
    async fn get_payment_and_position(
        &self,
        gateway: Address,
        payment_id: PaymentId,
    ) -> Result<(PaymentRecord, u64)>;

    /// Returns the confirmation depth configured on the gateway.
    async fn get_confirmation_depth(&self, gateway: Address) -> Result<u64>;

    /// Returns true if the gateway accepts payments in `token`.
    async fn is_token_whitelisted(&self, gateway: Address, token: Address) -> Result<bool>;
}

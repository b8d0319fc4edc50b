//! Confirmation-depth verification.
//!
//! A payment is **final** once it has been processed and at least `d` blocks
//! have passed since its payment block, where `d` is the confirmation depth:
//!
//! ```text
//! final  <=>  processed && current >= payment_block + d
//! ```
//!
//! The complementary test, `processed && payment_block + d > current`, says
//! the payment is still inside its confirmation window. Both are exposed;
//! [`ConfirmationVerifier::is_final`] is the one callers normally want.
//!
//! Unknown identifiers and unprocessed payments are never final and are not
//! errors. Ledger failures are returned as errors so an outage cannot be
//! mistaken for a pending payment.

use crate::errors::Result;
use crate::ledger::Ledger;
use crate::types::{ConfirmationPolicy, ConfirmationStatus, PaymentId, PaymentRecord};
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Returns true if `record` has reached finality at position `current`
/// under confirmation depth `depth`.
///
/// # Examples
///
/// ```
/// use opengateway_rs::types::{PaymentId, PaymentRecord};
/// use opengateway_rs::verifier::reached_finality;
///
/// let mut record = PaymentRecord::not_found(PaymentId::default());
/// record.processed = true;
/// record.payment_block = 500;
///
/// assert!(!reached_finality(&record, 505, 6));
/// assert!(reached_finality(&record, 506, 6));
/// ```
pub fn reached_finality(record: &PaymentRecord, current: u64, depth: u64) -> bool {
    record.processed && current >= record.payment_block.saturating_add(depth)
}

/// Returns true if `record` is processed but still inside its confirmation
/// window at position `current`.
pub fn within_confirmation_window(record: &PaymentRecord, current: u64, depth: u64) -> bool {
    record.processed && record.payment_block.saturating_add(depth) > current
}

/// Classifies `record` at position `current` under confirmation depth `depth`.
pub fn confirmation_status(record: &PaymentRecord, current: u64, depth: u64) -> ConfirmationStatus {
    if !record.processed {
        return ConfirmationStatus::Pending;
    }

    let confirmations = current.saturating_sub(record.payment_block);
    if reached_finality(record, current, depth) {
        ConfirmationStatus::Final {
            confirmations,
            required: depth,
        }
    } else {
        ConfirmationStatus::Confirming {
            confirmations,
            required: depth,
        }
    }
}

/// Decides whether payments on one gateway are final.
///
/// Cheap to clone; clones share the ledger handle.
pub struct ConfirmationVerifier<L: Ledger + ?Sized> {
    ledger: Arc<L>,
    gateway: Address,
    policy: ConfirmationPolicy,
}

impl<L: Ledger + ?Sized> Clone for ConfirmationVerifier<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            gateway: self.gateway,
            policy: self.policy,
        }
    }
}

impl<L: Ledger + ?Sized> ConfirmationVerifier<L> {
    /// Creates a verifier for `gateway`.
    ///
    /// With [`ConfirmationPolicy::Fixed`] the gateway's own depth is never
    /// queried.
    pub fn new(ledger: Arc<L>, gateway: Address, policy: ConfirmationPolicy) -> Self {
        Self {
            ledger,
            gateway,
            policy,
        }
    }

    /// Gateway this verifier checks.
    pub fn gateway(&self) -> Address {
        self.gateway
    }

    /// Confirmation policy in effect.
    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Resolves the confirmation depth, querying the ledger only when no
    /// fixed depth is configured.
    pub async fn confirmation_depth(&self) -> Result<u64> {
        match self.policy {
            ConfirmationPolicy::Fixed(depth) => Ok(depth),
            ConfirmationPolicy::FromLedger => self
                .ledger
                .get_confirmation_depth(self.gateway)
                .await
                .map_err(|e| {
                    warn!(
                        "Confirmation depth query failed for gateway {:?}: {}",
                        self.gateway, e
                    );
                    e
                }),
        }
    }

    /// Returns true if the payment has been processed and has reached its
    /// confirmation depth.
    ///
    /// An identifier the gateway has never seen returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error if either query fails. No retry is made.
    pub async fn is_final(&self, payment_id: PaymentId) -> Result<bool> {
        let (record, current, depth) = self.lookup(payment_id).await?;
        Ok(reached_finality(&record, current, depth))
    }

    /// Returns true if the payment has been processed but fewer than the
    /// required number of blocks have passed.
    pub async fn is_within_confirmation_window(&self, payment_id: PaymentId) -> Result<bool> {
        let (record, current, depth) = self.lookup(payment_id).await?;
        Ok(within_confirmation_window(&record, current, depth))
    }

    /// Reports where the payment stands relative to its confirmation depth.
    pub async fn confirmation_status(&self, payment_id: PaymentId) -> Result<ConfirmationStatus> {
        let (record, current, depth) = self.lookup(payment_id).await?;
        let status = confirmation_status(&record, current, depth);

        debug!("Payment {} status: {:?}", payment_id, status);

        Ok(status)
    }

    async fn lookup(&self, payment_id: PaymentId) -> Result<(PaymentRecord, u64, u64)> {
        let (record, current) = self
            .ledger
            .get_payment_and_position(self.gateway, payment_id)
            .await
            .map_err(|e| {
                warn!("Payment query failed for {}: {}", payment_id, e);
                e
            })?;
        let depth = self.confirmation_depth().await?;

        debug!(
            "Payment {} on gateway {:?}: processed={} block={} current={} depth={}",
            payment_id, self.gateway, record.processed, record.payment_block, current, depth
        );

        Ok((record, current, depth))
    }
}

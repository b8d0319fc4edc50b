//! In-process ledger.
//!
//! Mirrors the gateway contract's bookkeeping closely enough to exercise the
//! client without a chain: one shared position counter, and per gateway a
//! confirmation depth, a token whitelist and the payment table. The position
//! only moves when the owner calls [`MemoryLedger::advance`] or
//! [`MemoryLedger::set_position`].

use crate::errors::{GatewayError, Result};
use crate::ledger::Ledger;
use crate::types::{PaymentId, PaymentParams, PaymentRecord, SubmissionReceipt, NATIVE_TOKEN};
use async_trait::async_trait;
use ethers::types::Address;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct GatewayState {
    confirmation_depth: u64,
    whitelist: HashSet<Address>,
    payments: HashMap<PaymentId, PaymentRecord>,
}

#[derive(Debug, Default)]
struct LedgerState {
    position: u64,
    offline: bool,
    gateways: HashMap<Address, GatewayState>,
}

impl LedgerState {
    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(GatewayError::LedgerUnavailable(
                "in-memory ledger is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn gateway(&self, gateway: Address) -> Result<&GatewayState> {
        self.gateways
            .get(&gateway)
            .ok_or_else(|| no_gateway(gateway))
    }
}

fn no_gateway(gateway: Address) -> GatewayError {
    GatewayError::ContractReverted(format!("no gateway deployed at {:?}", gateway))
}

/// [`Ledger`] kept entirely in memory.
///
/// # Examples
///
/// ```
/// use ethers::types::{Address, U256};
/// use opengateway_rs::ledger::{Ledger, MemoryLedger};
/// use opengateway_rs::types::{PaymentParams, PrePaymentParams};
///
/// # async fn example() -> opengateway_rs::Result<()> {
/// let gateway = Address::repeat_byte(0x42);
/// let ledger = MemoryLedger::new();
/// ledger.register_gateway(gateway, 6, []).await;
///
/// let pre = PrePaymentParams::native(U256::from(1000u64), Address::repeat_byte(1), "order-42")?;
/// let params = PaymentParams::new(pre, "app-1");
/// ledger.submit_payment(gateway, &params).await?;
///
/// let (record, _) = ledger.get_payment_and_position(gateway, params.payment_id()).await?;
/// assert!(record.processed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    payment_queries: AtomicU64,
    depth_queries: AtomicU64,
}

impl MemoryLedger {
    /// Creates an empty ledger at position zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger at `position`.
    pub fn at_position(position: u64) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                position,
                ..LedgerState::default()
            }),
            ..Self::default()
        }
    }

    /// Deploys a gateway with the given confirmation depth and ERC-20 whitelist.
    ///
    /// Re-registering an address keeps its payments and replaces the depth
    /// and whitelist.
    pub async fn register_gateway(
        &self,
        gateway: Address,
        confirmation_depth: u64,
        tokens: impl IntoIterator<Item = Address>,
    ) {
        let mut state = self.state.write().await;
        let entry = state.gateways.entry(gateway).or_default();
        entry.confirmation_depth = confirmation_depth;
        entry.whitelist = tokens.into_iter().collect();
        debug!(
            "Registered gateway {:?} (depth={}, tokens={})",
            gateway,
            confirmation_depth,
            entry.whitelist.len()
        );
    }

    /// Changes a gateway's confirmation depth.
    pub async fn set_confirmation_depth(&self, gateway: Address, depth: u64) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .gateways
            .get_mut(&gateway)
            .ok_or_else(|| no_gateway(gateway))?;
        entry.confirmation_depth = depth;
        Ok(())
    }

    /// Adds `token` to a gateway's whitelist.
    pub async fn whitelist_token(&self, gateway: Address, token: Address) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .gateways
            .get_mut(&gateway)
            .ok_or_else(|| no_gateway(gateway))?;
        entry.whitelist.insert(token);
        Ok(())
    }

    /// Removes `token` from a gateway's whitelist. Recorded payments are kept.
    pub async fn delist_token(&self, gateway: Address, token: Address) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .gateways
            .get_mut(&gateway)
            .ok_or_else(|| no_gateway(gateway))?;
        entry.whitelist.remove(&token);
        Ok(())
    }

    /// Stores `record` as-is, bypassing submission checks.
    ///
    /// Useful for states submission never produces, such as a recorded but
    /// unprocessed payment.
    pub async fn insert_record(&self, gateway: Address, record: PaymentRecord) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .gateways
            .get_mut(&gateway)
            .ok_or_else(|| no_gateway(gateway))?;
        entry.payments.insert(record.payment_id, record);
        Ok(())
    }

    /// Moves the position forward by `blocks` and returns the new position.
    pub async fn advance(&self, blocks: u64) -> u64 {
        let mut state = self.state.write().await;
        state.position = state.position.saturating_add(blocks);
        state.position
    }

    /// Sets the position.
    pub async fn set_position(&self, position: u64) {
        self.state.write().await.position = position;
    }

    /// Current position.
    pub async fn position(&self) -> u64 {
        self.state.read().await.position
    }

    /// Makes every ledger call fail with [`GatewayError::LedgerUnavailable`]
    /// while `offline` is true.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Number of payment queries answered or attempted so far.
    pub fn payment_queries(&self) -> u64 {
        self.payment_queries.load(Ordering::Relaxed)
    }

    /// Number of confirmation-depth queries answered or attempted so far.
    pub fn depth_queries(&self) -> u64 {
        self.depth_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit_payment(
        &self,
        gateway: Address,
        params: &PaymentParams,
    ) -> Result<SubmissionReceipt> {
        let mut state = self.state.write().await;
        state.check_online()?;

        let position = state.position;
        let entry = state
            .gateways
            .get_mut(&gateway)
            .ok_or_else(|| no_gateway(gateway))?;

        if !params.is_native() && !entry.whitelist.contains(&params.token_address()) {
            return Err(GatewayError::ContractReverted(format!(
                "token {:?} is not whitelisted",
                params.token_address()
            )));
        }
        if entry.payments.contains_key(&params.payment_id()) {
            return Err(GatewayError::ContractReverted(format!(
                "payment {} already exists",
                params.payment_id()
            )));
        }

        let record = PaymentRecord {
            amount: params.amount(),
            payment_id: params.payment_id(),
            payment_block: position,
            token_address: params.token_address(),
            token_type: params.pre_payment().token_type(),
            payer: params.payer(),
            metadata: params.metadata().to_string(),
            processed: true,
        };
        entry.payments.insert(record.payment_id, record);

        info!(
            "Recorded payment {} on gateway {:?} at position {}",
            params.payment_id(),
            gateway,
            position
        );

        Ok(SubmissionReceipt {
            payment_id: params.payment_id(),
            tx_hash: None,
            block_number: Some(position),
        })
    }

    async fn get_payment_and_position(
        &self,
        gateway: Address,
        payment_id: PaymentId,
    ) -> Result<(PaymentRecord, u64)> {
        self.payment_queries.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read().await;
        state.check_online()?;

        let record = state
            .gateway(gateway)?
            .payments
            .get(&payment_id)
            .cloned()
            .unwrap_or_else(|| PaymentRecord::not_found(payment_id));

        Ok((record, state.position))
    }

    async fn get_confirmation_depth(&self, gateway: Address) -> Result<u64> {
        self.depth_queries.fetch_add(1, Ordering::Relaxed);

        let state = self.state.read().await;
        state.check_online()?;
        Ok(state.gateway(gateway)?.confirmation_depth)
    }

    async fn is_token_whitelisted(&self, gateway: Address, token: Address) -> Result<bool> {
        let state = self.state.read().await;
        state.check_online()?;
        let entry = state.gateway(gateway)?;
        Ok(token == NATIVE_TOKEN || entry.whitelist.contains(&token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrePaymentParams;
    use ethers::types::U256;

    const GATEWAY: Address = Address::repeat_byte(0x42);
    const USDC: Address = Address::repeat_byte(0xaa);

    async fn ledger() -> MemoryLedger {
        let ledger = MemoryLedger::at_position(100);
        ledger.register_gateway(GATEWAY, 6, [USDC]).await;
        ledger
    }

    fn payment(token: Address) -> PaymentParams {
        let pre = PrePaymentParams::new(U256::from(500u64), token, Address::repeat_byte(1), "m")
            .unwrap();
        PaymentParams::new(pre, "test")
    }

    #[tokio::test]
    async fn test_submit_records_at_current_position() {
        let ledger = ledger().await;
        let params = payment(NATIVE_TOKEN);

        let receipt = ledger.submit_payment(GATEWAY, &params).await.unwrap();
        assert_eq!(receipt.block_number, Some(100));
        assert!(receipt.tx_hash.is_none());

        ledger.advance(3).await;
        let (record, position) = ledger
            .get_payment_and_position(GATEWAY, params.payment_id())
            .await
            .unwrap();
        assert_eq!(record.payment_block, 100);
        assert_eq!(position, 103);
        assert!(record.processed);
        assert_eq!(record.metadata, "m");
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found_record() {
        let ledger = ledger().await;
        let id = PaymentId::from_bytes([5; 32]);

        let (record, _) = ledger.get_payment_and_position(GATEWAY, id).await.unwrap();
        assert!(record.is_not_found());
        assert_eq!(record.payment_id, id);
    }

    #[tokio::test]
    async fn test_duplicate_and_unlisted_tokens_revert() {
        let ledger = ledger().await;
        let params = payment(USDC);
        ledger.submit_payment(GATEWAY, &params).await.unwrap();

        let err = ledger.submit_payment(GATEWAY, &params).await.unwrap_err();
        assert!(matches!(err, GatewayError::ContractReverted(_)));

        let other = payment(Address::repeat_byte(0xbb));
        let err = ledger.submit_payment(GATEWAY, &other).await.unwrap_err();
        assert!(matches!(err, GatewayError::ContractReverted(_)));
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let ledger = ledger().await;
        ledger.set_offline(true).await;

        let err = ledger.get_confirmation_depth(GATEWAY).await.unwrap_err();
        assert!(matches!(err, GatewayError::LedgerUnavailable(_)));

        ledger.set_offline(false).await;
        assert_eq!(ledger.get_confirmation_depth(GATEWAY).await.unwrap(), 6);
        assert_eq!(ledger.depth_queries(), 2);
    }

    #[tokio::test]
    async fn test_unknown_gateway() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .get_payment_and_position(GATEWAY, PaymentId::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ContractReverted(_)));
    }

    #[tokio::test]
    async fn test_whitelist() {
        let ledger = ledger().await;
        let dai = Address::repeat_byte(0xdd);

        assert!(ledger.is_token_whitelisted(GATEWAY, NATIVE_TOKEN).await.unwrap());
        assert!(ledger.is_token_whitelisted(GATEWAY, USDC).await.unwrap());
        assert!(!ledger.is_token_whitelisted(GATEWAY, dai).await.unwrap());

        ledger.whitelist_token(GATEWAY, dai).await.unwrap();
        assert!(ledger.is_token_whitelisted(GATEWAY, dai).await.unwrap());
    }

    #[tokio::test]
    async fn test_delisted_token_rejects_new_payments() {
        let ledger = ledger().await;
        let paid = payment(USDC);
        ledger.submit_payment(GATEWAY, &paid).await.unwrap();

        ledger.delist_token(GATEWAY, USDC).await.unwrap();
        assert!(!ledger.is_token_whitelisted(GATEWAY, USDC).await.unwrap());

        let err = ledger.submit_payment(GATEWAY, &payment(USDC)).await.unwrap_err();
        assert!(matches!(err, GatewayError::ContractReverted(_)));

        let (record, _) = ledger
            .get_payment_and_position(GATEWAY, paid.payment_id())
            .await
            .unwrap();
        assert!(record.processed);

        assert!(ledger.delist_token(Address::zero(), USDC).await.is_err());
    }
}

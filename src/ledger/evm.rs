//! Ledger backed by a deployed OpenGateway contract on an EVM chain.
//!
//! Queries go through a plain HTTP provider. Submitting payments needs a
//! signing key; without one the ledger is read-only and submission fails with
//! [`GatewayError::SignerRequired`].

use crate::errors::{GatewayError, Result};
use crate::ledger::Ledger;
use crate::types::{
    PaymentId, PaymentParams, PaymentRecord, PermitSignature, SubmissionReceipt, TokenType,
    NATIVE_TOKEN,
};
use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

// OpenGateway contract surface used by the client
abigen!(
    OpenGateway,
    r#"[
        struct PaymentMetadata { uint256 amount; bytes32 paymentId; uint256 paymentBlock; address tokenAddress; uint8 tokenType; address payer; string metadata; bool processed; }
        function getPayment(bytes32 paymentId) external view returns (PaymentMetadata paymentMetadata, uint256 currentBlock)
        function confirmationBlockHeight() external view returns (uint256)
        function tokenWhitelist(address token) external view returns (bool)
        function makePayment(uint256 amount, bytes32 paymentId, address tokenAddress, address payer, string metadata) external payable
        function makePaymentWithPermit(uint256 amount, bytes32 paymentId, address tokenAddress, address payer, uint256 deadline, uint8 v, bytes32 r, bytes32 s, string metadata) external
        function whitelistToken(address[] tokens) external
        function delistToken(address[] tokens) external
        function updateConfirmationBlockHeight(uint256 newConfirmationBlockHeight) external
        function withdrawNative(address recipient) external returns (bool)
        function withdrawERC20(address token, address recipient) external returns (bool)
    ]"#
);

abigen!(
    Erc20Token,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// `PaymentMetadata` as returned inside `getPayment`'s output tuple.
type RawPaymentMetadata = (U256, [u8; 32], U256, Address, u8, Address, String, bool);

/// [`Ledger`] implementation talking to OpenGateway contracts over JSON-RPC.
#[derive(Clone)]
pub struct EvmLedger {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerClient>>,
}

impl EvmLedger {
    /// Creates a read-only ledger for the given RPC endpoint.
    ///
    /// No request is made until the first query.
    ///
    /// # Examples
    ///
    /// ```
    /// use opengateway_rs::ledger::EvmLedger;
    ///
    /// let ledger = EvmLedger::connect("https://mainnet.base.org").unwrap();
    /// assert!(!ledger.can_submit());
    /// ```
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Ok(Self {
            provider: Arc::new(provider),
            signer: None,
        })
    }

    /// Enables payment submission, signing with `private_key`.
    ///
    /// Queries the chain id so signed transactions carry replay protection.
    pub async fn with_signer(mut self, private_key: &str) -> Result<Self> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| GatewayError::ConfigError(format!("Invalid signer key: {}", e)))?;
        let chain_id = self.provider.get_chainid().await?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());

        debug!(
            "Signer {:?} enabled on chain {}",
            wallet.address(),
            chain_id
        );

        let client = SignerMiddleware::new(self.provider.as_ref().clone(), wallet);
        self.signer = Some(Arc::new(client));
        Ok(self)
    }

    /// Returns true if a signer is configured.
    pub fn can_submit(&self) -> bool {
        self.signer.is_some()
    }

    /// Address of the configured signer, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|client| client.address())
    }

    /// Pays with an ERC-20 token using an EIP-2612 permit instead of a
    /// separate approval transaction.
    pub async fn submit_payment_with_permit(
        &self,
        gateway: Address,
        params: &PaymentParams,
        permit: &PermitSignature,
    ) -> Result<SubmissionReceipt> {
        if params.is_native() {
            return Err(GatewayError::InvalidPayload(
                "Permit payments require an ERC-20 token".to_string(),
            ));
        }

        let client = self.signer_client("permit payment")?;
        let contract = OpenGateway::new(gateway, client);

        info!(
            "Submitting permit payment {} of {} token {:?} to gateway {:?}",
            params.payment_id(),
            params.amount(),
            params.token_address(),
            gateway
        );

        let call = contract.make_payment_with_permit(
            params.amount(),
            params.payment_id().to_bytes(),
            params.token_address(),
            params.payer(),
            permit.deadline,
            permit.v,
            permit.r,
            permit.s,
            params.metadata().to_string(),
        );
        let pending_tx = call.send().await?;
        let receipt = wait_for_receipt(pending_tx.await?, "permit payment")?;

        Ok(receipt_for(params.payment_id(), &receipt))
    }

    /// Adds `tokens` to the gateway's ERC-20 whitelist. Owner only.
    pub async fn whitelist_tokens(&self, gateway: Address, tokens: &[Address]) -> Result<H256> {
        let contract = OpenGateway::new(gateway, self.signer_client("token whitelisting")?);
        info!("Whitelisting {} token(s) on gateway {:?}", tokens.len(), gateway);
        execute(contract.whitelist_token(tokens.to_vec()), "whitelist").await
    }

    /// Removes `tokens` from the gateway's ERC-20 whitelist. Owner only.
    pub async fn delist_tokens(&self, gateway: Address, tokens: &[Address]) -> Result<H256> {
        let contract = OpenGateway::new(gateway, self.signer_client("token delisting")?);
        info!("Delisting {} token(s) on gateway {:?}", tokens.len(), gateway);
        execute(contract.delist_token(tokens.to_vec()), "delist").await
    }

    /// Changes the gateway's confirmation depth. Owner only.
    pub async fn update_confirmation_depth(&self, gateway: Address, depth: u64) -> Result<H256> {
        let contract = OpenGateway::new(gateway, self.signer_client("confirmation depth update")?);
        info!("Setting confirmation depth of gateway {:?} to {}", gateway, depth);
        let call = contract.update_confirmation_block_height(U256::from(depth));
        execute(call, "confirmation depth update").await
    }

    /// Sends the gateway's native balance to `recipient`. Owner only.
    pub async fn withdraw_native(&self, gateway: Address, recipient: Address) -> Result<H256> {
        let contract = OpenGateway::new(gateway, self.signer_client("native withdrawal")?);
        info!("Withdrawing native balance of gateway {:?} to {:?}", gateway, recipient);
        execute(contract.withdraw_native(recipient), "native withdrawal").await
    }

    /// Sends the gateway's balance of `token` to `recipient`. Owner only.
    pub async fn withdraw_erc20(
        &self,
        gateway: Address,
        token: Address,
        recipient: Address,
    ) -> Result<H256> {
        let contract = OpenGateway::new(gateway, self.signer_client("token withdrawal")?);
        info!(
            "Withdrawing token {:?} from gateway {:?} to {:?}",
            token, gateway, recipient
        );
        execute(contract.withdraw_erc20(token, recipient), "token withdrawal").await
    }

    fn signer_client(&self, operation: &'static str) -> Result<Arc<SignerClient>> {
        self.signer
            .clone()
            .ok_or(GatewayError::SignerRequired(operation))
    }

    async fn approve_token(
        &self,
        client: Arc<SignerClient>,
        gateway: Address,
        params: &PaymentParams,
    ) -> Result<()> {
        let token = Erc20Token::new(params.token_address(), client);

        debug!(
            "Approving gateway {:?} to spend {} of token {:?}",
            gateway,
            params.amount(),
            params.token_address()
        );

        let call = token.approve(gateway, params.amount());
        let pending_tx = call.send().await?;
        wait_for_receipt(pending_tx.await?, "token approval")?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn submit_payment(
        &self,
        gateway: Address,
        params: &PaymentParams,
    ) -> Result<SubmissionReceipt> {
        let client = self.signer_client("payment submission")?;

        if !params.is_native() {
            self.approve_token(client.clone(), gateway, params).await?;
        }

        let contract = OpenGateway::new(gateway, client);

        info!(
            "Submitting payment {} of {} (token {:?}) to gateway {:?}",
            params.payment_id(),
            params.amount(),
            params.token_address(),
            gateway
        );

        let mut call = contract.make_payment(
            params.amount(),
            params.payment_id().to_bytes(),
            params.token_address(),
            params.payer(),
            params.metadata().to_string(),
        );
        if params.is_native() {
            call = call.value(params.amount());
        }

        let pending_tx = call.send().await?;
        let receipt = wait_for_receipt(pending_tx.await?, "payment")?;

        Ok(receipt_for(params.payment_id(), &receipt))
    }

    async fn get_payment_and_position(
        &self,
        gateway: Address,
        payment_id: PaymentId,
    ) -> Result<(PaymentRecord, u64)> {
        let contract = OpenGateway::new(gateway, self.provider.clone());
        let (metadata, current_block) = contract.get_payment(payment_id.to_bytes()).call().await?;

        let current_block = u256_to_u64(current_block, "currentBlock")?;
        let record = PaymentRecord::try_from(payment_metadata(metadata))?;
        let record = if record.is_not_found() {
            PaymentRecord::not_found(payment_id)
        } else {
            record
        };

        debug!(
            "Gateway {:?} payment {}: processed={} block={} current={}",
            gateway, payment_id, record.processed, record.payment_block, current_block
        );

        Ok((record, current_block))
    }

    async fn get_confirmation_depth(&self, gateway: Address) -> Result<u64> {
        let contract = OpenGateway::new(gateway, self.provider.clone());
        let depth = contract.confirmation_block_height().call().await?;
        u256_to_u64(depth, "confirmationBlockHeight")
    }

    async fn is_token_whitelisted(&self, gateway: Address, token: Address) -> Result<bool> {
        if token == NATIVE_TOKEN {
            return Ok(true);
        }
        let contract = OpenGateway::new(gateway, self.provider.clone());
        Ok(contract.token_whitelist(token).call().await?)
    }
}

impl TryFrom<PaymentMetadata> for PaymentRecord {
    type Error = GatewayError;

    fn try_from(metadata: PaymentMetadata) -> Result<Self> {
        Ok(PaymentRecord {
            amount: metadata.amount,
            payment_id: PaymentId::from_bytes(metadata.payment_id),
            payment_block: u256_to_u64(metadata.payment_block, "paymentBlock")?,
            token_address: metadata.token_address,
            token_type: TokenType::try_from(metadata.token_type)?,
            payer: metadata.payer,
            metadata: metadata.metadata,
            processed: metadata.processed,
        })
    }
}

fn payment_metadata(raw: RawPaymentMetadata) -> PaymentMetadata {
    let (amount, payment_id, payment_block, token_address, token_type, payer, metadata, processed) =
        raw;
    PaymentMetadata {
        amount,
        payment_id,
        payment_block,
        token_address,
        token_type,
        payer,
        metadata,
        processed,
    }
}

fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(GatewayError::InvalidPayload(format!(
            "{} out of range: {}",
            field, value
        )));
    }
    Ok(value.as_u64())
}

fn wait_for_receipt(
    receipt: Option<TransactionReceipt>,
    operation: &str,
) -> Result<TransactionReceipt> {
    receipt.ok_or_else(|| {
        GatewayError::TransactionDropped(format!("No receipt for {} transaction", operation))
    })
}

async fn execute<D: Detokenize>(
    call: ContractCall<SignerClient, D>,
    operation: &str,
) -> Result<H256> {
    let pending_tx = call.send().await?;
    let receipt = wait_for_receipt(pending_tx.await?, operation)?;
    debug!("{} confirmed in {:?}", operation, receipt.transaction_hash);
    Ok(receipt.transaction_hash)
}

fn receipt_for(payment_id: PaymentId, receipt: &TransactionReceipt) -> SubmissionReceipt {
    SubmissionReceipt {
        payment_id,
        tx_hash: Some(receipt.transaction_hash),
        block_number: receipt.block_number.map(|block| block.as_u64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(processed: bool, block: u64) -> PaymentMetadata {
        PaymentMetadata {
            amount: U256::from(1000u64),
            payment_id: [9u8; 32],
            payment_block: U256::from(block),
            token_address: Address::zero(),
            token_type: 0,
            payer: Address::repeat_byte(0x11),
            metadata: "order-42".to_string(),
            processed,
        }
    }

    #[test]
    fn test_metadata_to_record() {
        let record = PaymentRecord::try_from(metadata(true, 500)).unwrap();
        assert_eq!(record.payment_block, 500);
        assert_eq!(record.token_type, TokenType::Native);
        assert_eq!(record.payment_id, PaymentId::from_bytes([9u8; 32]));
        assert!(record.processed);
    }

    #[test]
    fn test_get_payment_tuple_to_record() {
        let raw: RawPaymentMetadata = (
            U256::from(1000u64),
            [9u8; 32],
            U256::from(500u64),
            Address::repeat_byte(0xaa),
            1,
            Address::repeat_byte(0x11),
            "order-42".to_string(),
            true,
        );

        let record = PaymentRecord::try_from(payment_metadata(raw)).unwrap();
        assert_eq!(record.amount, U256::from(1000u64));
        assert_eq!(record.payment_block, 500);
        assert_eq!(record.token_address, Address::repeat_byte(0xaa));
        assert_eq!(record.token_type, TokenType::Erc20);
        assert_eq!(record.payer, Address::repeat_byte(0x11));
        assert_eq!(record.metadata, "order-42");
        assert!(record.processed);
    }

    #[test]
    fn test_zeroed_get_payment_tuple_is_not_found() {
        let raw: RawPaymentMetadata = (
            U256::zero(),
            [0u8; 32],
            U256::zero(),
            Address::zero(),
            0,
            Address::zero(),
            String::new(),
            false,
        );
        assert!(PaymentRecord::try_from(payment_metadata(raw))
            .unwrap()
            .is_not_found());
    }

    #[test]
    fn test_metadata_with_bad_fields() {
        let mut bad = metadata(true, 1);
        bad.token_type = 7;
        assert!(PaymentRecord::try_from(bad).is_err());

        let mut huge = metadata(true, 1);
        huge.payment_block = U256::MAX;
        assert!(matches!(
            PaymentRecord::try_from(huge),
            Err(GatewayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_read_only_ledger() {
        let ledger = EvmLedger::connect("http://localhost:8545").unwrap();
        assert!(!ledger.can_submit());
        assert!(ledger.signer_address().is_none());
        assert!(matches!(
            ledger.signer_client("payment submission"),
            Err(GatewayError::SignerRequired("payment submission"))
        ));
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        assert!(matches!(
            EvmLedger::connect("not a url"),
            Err(GatewayError::UrlParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_without_signer() {
        let ledger = EvmLedger::connect("http://localhost:8545").unwrap();
        let payer = Address::repeat_byte(0x22);
        let params = PaymentParams::new(
            crate::types::PrePaymentParams::native(U256::from(1u64), payer, "").unwrap(),
            "test",
        );

        let err = ledger
            .submit_payment(Address::repeat_byte(0x33), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SignerRequired(_)));
    }

    #[tokio::test]
    async fn test_owner_calls_need_signer() {
        let ledger = EvmLedger::connect("http://localhost:8545").unwrap();
        let gateway = Address::repeat_byte(0x33);
        let token = Address::repeat_byte(0xaa);
        let recipient = Address::repeat_byte(0x44);

        let results = [
            ledger.whitelist_tokens(gateway, &[token]).await,
            ledger.delist_tokens(gateway, &[token]).await,
            ledger.update_confirmation_depth(gateway, 12).await,
            ledger.withdraw_native(gateway, recipient).await,
            ledger.withdraw_erc20(gateway, token, recipient).await,
        ];
        for result in results {
            assert!(matches!(result, Err(GatewayError::SignerRequired(_))));
        }
    }
}

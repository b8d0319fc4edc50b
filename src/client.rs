//! Client-side entry point for a single OpenGateway deployment.
//!
//! [`GatewayClient`] bundles the configuration, a [`Ledger`] handle and a
//! [`ConfirmationVerifier`], and exposes the whole payment flow: create a
//! payment with a fresh identifier, submit it, and later check whether it is
//! final.

use crate::errors::{GatewayError, Result};
use crate::ledger::{EvmLedger, Ledger};
use crate::payment_id::create_payment;
use crate::types::{
    ConfirmationPolicy, ConfirmationStatus, PaymentId, PaymentParams, PaymentRecord,
    PermitSignature, PrePaymentParams, SubmissionReceipt,
};
use crate::utils::parse_address;
use crate::verifier::ConfirmationVerifier;
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Environment variable holding the JSON-RPC endpoint.
pub const ENV_RPC_URL: &str = "OPENGATEWAY_RPC_URL";
/// Environment variable holding the gateway contract address.
pub const ENV_GATEWAY_ADDRESS: &str = "OPENGATEWAY_ADDRESS";
/// Environment variable holding a fixed confirmation depth.
pub const ENV_CONFIRMATIONS: &str = "OPENGATEWAY_CONFIRMATIONS";
/// Environment variable holding the signing key used for submissions.
pub const ENV_SIGNER_KEY: &str = "OPENGATEWAY_SIGNER_KEY";
/// Environment variable holding the namespace salt for payment identifiers.
pub const ENV_NAMESPACE: &str = "OPENGATEWAY_NAMESPACE";

/// Configuration for a gateway client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayClientConfig {
    /// RPC URL for blockchain interactions
    pub rpc_url: String,

    /// Address of the deployed gateway contract
    pub gateway: Address,

    /// Fixed confirmation depth; overrides the gateway's own setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_depth: Option<u64>,

    /// Namespace salt mixed into every payment identifier
    #[serde(default)]
    pub namespace_salt: String,

    /// Private key used to submit payments (read-only client if absent)
    #[serde(default, skip_serializing)]
    pub signer_key: Option<String>,
}

impl fmt::Debug for GatewayClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("gateway", &self.gateway)
            .field("confirmation_depth", &self.confirmation_depth)
            .field("namespace_salt", &self.namespace_salt)
            .field("signer_key", &self.signer_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GatewayClientConfig {
    /// Creates a new client configuration.
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - RPC endpoint URL
    /// * `gateway` - Address of the deployed gateway contract
    ///
    /// # Examples
    ///
    /// ```
    /// use ethers::types::{Address, H256};
    /// use opengateway_rs::client::GatewayClientConfig;
    ///
    /// let config = GatewayClientConfig::new("https://mainnet.base.org", Address::repeat_byte(0x42))
    ///     .with_confirmation_depth(6)
    ///     .with_namespace_salt("app-1");
    ///
    /// assert_eq!(config.confirmation_depth, Some(6));
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(rpc_url: impl Into<String>, gateway: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            gateway,
            confirmation_depth: None,
            namespace_salt: String::new(),
            signer_key: None,
        }
    }

    /// Loads the configuration from `OPENGATEWAY_*` environment variables.
    ///
    /// `OPENGATEWAY_RPC_URL` and `OPENGATEWAY_ADDRESS` are required;
    /// `OPENGATEWAY_CONFIRMATIONS`, `OPENGATEWAY_SIGNER_KEY` and
    /// `OPENGATEWAY_NAMESPACE` are optional.
    pub fn from_env() -> Result<Self> {
        let rpc_url = required_env(ENV_RPC_URL)?;
        let gateway = parse_address(&required_env(ENV_GATEWAY_ADDRESS)?)?;

        let mut config = Self::new(rpc_url, gateway);

        if let Some(depth) = optional_env(ENV_CONFIRMATIONS) {
            let depth = depth.parse::<u64>().map_err(|e| {
                let reason = format!("{} must be a block count: {}", ENV_CONFIRMATIONS, e);
                GatewayError::ConfigError(reason)
            })?;
            config = config.with_confirmation_depth(depth);
        }
        if let Some(key) = optional_env(ENV_SIGNER_KEY) {
            config = config.with_signer_key(key);
        }
        if let Some(salt) = optional_env(ENV_NAMESPACE) {
            config = config.with_namespace_salt(salt);
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets a fixed confirmation depth.
    pub fn with_confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = Some(depth);
        self
    }

    /// Sets the namespace salt.
    pub fn with_namespace_salt(mut self, salt: impl Into<String>) -> Self {
        self.namespace_salt = salt.into();
        self
    }

    /// Sets the key used to sign payment submissions.
    pub fn with_signer_key(mut self, key: impl Into<String>) -> Self {
        self.signer_key = Some(key.into());
        self
    }

    /// Confirmation policy implied by this configuration.
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        self.confirmation_depth.into()
    }

    /// Checks that the RPC URL is usable and the gateway address is set.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.rpc_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::ConfigError(format!(
                "Unsupported RPC scheme: {}",
                url.scheme()
            )));
        }
        if self.gateway.is_zero() {
            return Err(GatewayError::ConfigError(
                "Gateway address must not be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| GatewayError::ConfigError(format!("{} is not set", name)))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Payment client for one gateway.
///
/// Generic over the [`Ledger`] so the same flow runs against a chain
/// ([`EvmLedger`]) or in memory.
pub struct GatewayClient<L: Ledger + ?Sized = EvmLedger> {
    config: GatewayClientConfig,
    ledger: Arc<L>,
    verifier: ConfirmationVerifier<L>,
}

impl<L: Ledger + ?Sized> Clone for GatewayClient<L> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            ledger: Arc::clone(&self.ledger),
            verifier: self.verifier.clone(),
        }
    }
}

impl GatewayClient<EvmLedger> {
    /// Connects to the chain described by `config`.
    ///
    /// With a signer key configured, the chain id is fetched so the client
    /// can submit payments.
    pub async fn connect(config: GatewayClientConfig) -> Result<Self> {
        config.validate()?;

        let mut ledger = EvmLedger::connect(&config.rpc_url)?;
        if let Some(key) = &config.signer_key {
            ledger = ledger.with_signer(key).await?;
        }

        info!(
            "Connected to gateway {:?} via {} (confirmations: {})",
            config.gateway,
            config.rpc_url,
            config
                .confirmation_depth
                .map_or_else(|| "from gateway".to_string(), |d| d.to_string())
        );

        Ok(Self::with_ledger(config, Arc::new(ledger)))
    }

    /// Pays with an ERC-20 token using an EIP-2612 permit.
    pub async fn submit_payment_with_permit(
        &self,
        params: &PaymentParams,
        permit: &PermitSignature,
    ) -> Result<SubmissionReceipt> {
        self.ledger
            .submit_payment_with_permit(self.config.gateway, params, permit)
            .await
    }

    /// Adds ERC-20 tokens to the gateway's whitelist. Needs the owner's key.
    pub async fn whitelist_tokens(&self, tokens: &[Address]) -> Result<H256> {
        self.ledger.whitelist_tokens(self.config.gateway, tokens).await
    }

    /// Removes ERC-20 tokens from the gateway's whitelist. Needs the owner's key.
    pub async fn delist_tokens(&self, tokens: &[Address]) -> Result<H256> {
        self.ledger.delist_tokens(self.config.gateway, tokens).await
    }

    /// Changes the gateway's own confirmation depth. Needs the owner's key.
    ///
    /// A fixed depth in this client's configuration still takes precedence
    /// when verifying.
    pub async fn update_confirmation_depth(&self, depth: u64) -> Result<H256> {
        self.ledger
            .update_confirmation_depth(self.config.gateway, depth)
            .await
    }

    /// Withdraws the gateway's native balance to `recipient`. Needs the owner's key.
    pub async fn withdraw_native(&self, recipient: Address) -> Result<H256> {
        self.ledger
            .withdraw_native(self.config.gateway, recipient)
            .await
    }

    /// Withdraws the gateway's balance of `token` to `recipient`. Needs the
    /// owner's key.
    pub async fn withdraw_erc20(&self, token: Address, recipient: Address) -> Result<H256> {
        self.ledger
            .withdraw_erc20(self.config.gateway, token, recipient)
            .await
    }
}

impl<L: Ledger + ?Sized> GatewayClient<L> {
    /// Creates a client over an existing ledger handle.
    pub fn with_ledger(config: GatewayClientConfig, ledger: Arc<L>) -> Self {
        let verifier = ConfirmationVerifier::new(
            Arc::clone(&ledger),
            config.gateway,
            config.confirmation_policy(),
        );
        Self {
            config,
            ledger,
            verifier,
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &GatewayClientConfig {
        &self.config
    }

    /// Underlying ledger handle.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Verifier for this client's gateway.
    pub fn verifier(&self) -> &ConfirmationVerifier<L> {
        &self.verifier
    }

    /// Assigns a fresh identifier to `params` using the configured namespace
    /// salt.
    pub fn create_payment(&self, params: PrePaymentParams) -> PaymentParams {
        create_payment(params, &self.config.namespace_salt)
    }

    /// Submits a created payment to the gateway.
    pub async fn submit_payment(&self, params: &PaymentParams) -> Result<SubmissionReceipt> {
        self.ledger.submit_payment(self.config.gateway, params).await
    }

    /// Fetches the payment record and the current block.
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<(PaymentRecord, u64)> {
        self.ledger
            .get_payment_and_position(self.config.gateway, payment_id)
            .await
    }

    /// Returns true if the payment is processed and final.
    pub async fn verify_payment(&self, payment_id: PaymentId) -> Result<bool> {
        self.verifier.is_final(payment_id).await
    }

    /// Reports where the payment stands relative to its confirmation depth.
    pub async fn confirmation_status(&self, payment_id: PaymentId) -> Result<ConfirmationStatus> {
        self.verifier.confirmation_status(payment_id).await
    }

    /// Confirmation depth in effect (the fixed value if configured).
    pub async fn confirmation_depth(&self) -> Result<u64> {
        self.verifier.confirmation_depth().await
    }

    /// Returns true if the gateway accepts payments in `token`.
    pub async fn is_token_whitelisted(&self, token: Address) -> Result<bool> {
        self.ledger
            .is_token_whitelisted(self.config.gateway, token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use ethers::types::U256;

    const GATEWAY: Address = Address::repeat_byte(0x42);

    #[test]
    fn test_client_config_creation() {
        let config = GatewayClientConfig::new("https://rpc.url", GATEWAY);
        assert_eq!(config.rpc_url, "https://rpc.url");
        assert_eq!(config.confirmation_depth, None);
        assert_eq!(config.confirmation_policy(), ConfirmationPolicy::FromLedger);
        assert!(config.namespace_salt.is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = GatewayClientConfig::new("https://rpc.url", GATEWAY)
            .with_confirmation_depth(12)
            .with_namespace_salt("shop")
            .with_signer_key("0xkey");

        assert_eq!(config.confirmation_policy(), ConfirmationPolicy::Fixed(12));
        assert_eq!(config.namespace_salt, "shop");
        assert_eq!(config.signer_key.as_deref(), Some("0xkey"));
    }

    #[test]
    fn test_config_validation() {
        assert!(GatewayClientConfig::new("not a url", GATEWAY).validate().is_err());
        assert!(matches!(
            GatewayClientConfig::new("ws://localhost:8546", GATEWAY).validate(),
            Err(GatewayError::ConfigError(_))
        ));
        assert!(matches!(
            GatewayClientConfig::new("http://localhost:8545", Address::zero()).validate(),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_hides_signer_key() {
        let config =
            GatewayClientConfig::new("https://rpc.url", GATEWAY).with_signer_key("0xsecret");

        assert!(!format!("{:?}", config).contains("0xsecret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("0xsecret"));
        assert!(json.contains("rpcUrl"));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "rpcUrl": "http://localhost:8545",
            "gateway": "0x4242424242424242424242424242424242424242",
            "confirmationDepth": 3
        }"#;
        let config: GatewayClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.gateway, GATEWAY);
        assert_eq!(config.confirmation_depth, Some(3));
        assert!(config.signer_key.is_none());
    }

    #[tokio::test]
    async fn test_client_over_memory_ledger() {
        let ledger = Arc::new(MemoryLedger::at_position(10));
        ledger.register_gateway(GATEWAY, 2, []).await;

        let config = GatewayClientConfig::new("http://localhost:8545", GATEWAY)
            .with_namespace_salt("app-1");
        let client = GatewayClient::with_ledger(config, ledger.clone());

        let pre = PrePaymentParams::native(U256::from(7u64), Address::repeat_byte(1), "x").unwrap();
        let params = client.create_payment(pre);
        client.submit_payment(&params).await.unwrap();

        assert!(!client.verify_payment(params.payment_id()).await.unwrap());
        ledger.advance(2).await;
        assert!(client.verify_payment(params.payment_id()).await.unwrap());
        assert_eq!(client.confirmation_depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_owner_calls_on_read_only_client() {
        let config = GatewayClientConfig::new("http://localhost:8545", GATEWAY);
        let ledger = EvmLedger::connect(&config.rpc_url).unwrap();
        let client = GatewayClient::with_ledger(config, Arc::new(ledger));
        let token = Address::repeat_byte(0xaa);

        assert!(matches!(
            client.whitelist_tokens(&[token]).await,
            Err(GatewayError::SignerRequired(_))
        ));
        assert!(matches!(
            client.update_confirmation_depth(3).await,
            Err(GatewayError::SignerRequired(_))
        ));
        assert!(matches!(
            client.withdraw_erc20(token, Address::repeat_byte(1)).await,
            Err(GatewayError::SignerRequired(_))
        ));
    }
}

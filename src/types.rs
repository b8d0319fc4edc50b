//! Core type definitions for OpenGateway payments.
//!
//! This module contains the data exchanged with the gateway contract: the
//! parameters of a payment before and after an identifier is assigned, the
//! record the ledger keeps for it, and the confirmation policy used to decide
//! finality.

use crate::errors::{GatewayError, Result};
use crate::utils::{parse_address, string_to_u256};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token address the gateway uses for payments in the chain's native currency.
pub const NATIVE_TOKEN: Address = Address::zero();

/// 32-byte key under which the gateway stores a payment.
///
/// The text form is `0x` followed by 64 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use opengateway_rs::types::PaymentId;
///
/// let id: PaymentId = "0x0101010101010101010101010101010101010101010101010101010101010101"
///     .parse()
///     .unwrap();
/// assert_eq!(id.as_bytes(), &[1u8; 32]);
/// assert_eq!(id.to_string().len(), 66);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentId([u8; 32]);

impl PaymentId {
    /// Length of the identifier in bytes.
    pub const LEN: usize = 32;

    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the raw bytes.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentId({})", self)
    }
}

impl FromStr for PaymentId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| GatewayError::InvalidPaymentId(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PaymentId {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PaymentId> for String {
    fn from(id: PaymentId) -> Self {
        id.to_string()
    }
}

impl From<[u8; 32]> for PaymentId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<PaymentId> for [u8; 32] {
    fn from(id: PaymentId) -> Self {
        id.0
    }
}

impl From<H256> for PaymentId {
    fn from(hash: H256) -> Self {
        Self(hash.0)
    }
}

impl From<PaymentId> for H256 {
    fn from(id: PaymentId) -> Self {
        H256(id.0)
    }
}

/// Economic description of an intended payment, before an identifier exists.
///
/// Construct with [`PrePaymentParams::new`], [`PrePaymentParams::native`] or,
/// from user-supplied strings, [`PrePaymentParams::parse`].
///
/// The amount must be greater than zero: every constructor rejects a zero
/// amount with [`GatewayError::InvalidAmount`], because the gateway reports
/// an unknown payment as a record with amount zero.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrePaymentParams {
    amount: U256,
    token_address: Address,
    payer: Address,
    metadata: String,
}

impl PrePaymentParams {
    /// Creates payment parameters for `token_address` (use [`NATIVE_TOKEN`]
    /// for the native currency).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAmount`] for a zero amount, since the
    /// gateway reports unknown payments with a zero amount.
    pub fn new(
        amount: U256,
        token_address: Address,
        payer: Address,
        metadata: impl Into<String>,
    ) -> Result<Self> {
        if amount.is_zero() {
            return Err(GatewayError::InvalidAmount(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            amount,
            token_address,
            payer,
            metadata: metadata.into(),
        })
    }

    /// Creates payment parameters for a native-currency payment.
    pub fn native(amount: U256, payer: Address, metadata: impl Into<String>) -> Result<Self> {
        Self::new(amount, NATIVE_TOKEN, payer, metadata)
    }

    /// Parses and validates payment parameters from text.
    ///
    /// `amount` may be decimal or `0x`-prefixed hex. `token_address` may be
    /// the literal `native` as a shorthand for [`NATIVE_TOKEN`].
    ///
    /// # Examples
    ///
    /// ```
    /// use opengateway_rs::types::PrePaymentParams;
    ///
    /// let params = PrePaymentParams::parse(
    ///     "1000",
    ///     "native",
    ///     "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
    ///     "order-42",
    /// )
    /// .unwrap();
    /// assert!(params.is_native());
    ///
    /// let payer = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb";
    /// assert!(PrePaymentParams::parse("-5", "native", payer, "").is_err());
    /// assert!(PrePaymentParams::parse("0", "native", payer, "").is_err());
    /// ```
    pub fn parse(
        amount: &str,
        token_address: &str,
        payer: &str,
        metadata: impl Into<String>,
    ) -> Result<Self> {
        let amount = string_to_u256(amount)?;
        let token_address = if token_address.eq_ignore_ascii_case("native") {
            NATIVE_TOKEN
        } else {
            parse_address(token_address)?
        };
        let payer = parse_address(payer)?;

        Self::new(amount, token_address, payer, metadata)
    }

    /// Amount in the token's smallest unit.
    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// Token contract address, or [`NATIVE_TOKEN`].
    pub fn token_address(&self) -> Address {
        self.token_address
    }

    /// Address making the payment.
    pub fn payer(&self) -> Address {
        self.payer
    }

    /// Caller-defined metadata, passed through to the gateway untouched.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Returns true when paying in the chain's native currency.
    pub fn is_native(&self) -> bool {
        self.token_address == NATIVE_TOKEN
    }

    /// Kind of token this payment moves.
    pub fn token_type(&self) -> TokenType {
        if self.is_native() {
            TokenType::Native
        } else {
            TokenType::Erc20
        }
    }
}

/// Payment parameters together with their generated identifier.
///
/// Only produced by [`crate::payment_id::create_payment`] (or
/// [`PaymentParams::new`]), and read-only afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentParams {
    payment_id: PaymentId,
    #[serde(flatten)]
    params: PrePaymentParams,
}

impl PaymentParams {
    /// Assigns a fresh identifier to `params`, scoped by `namespace_salt`.
    pub fn new(params: PrePaymentParams, namespace_salt: &str) -> Self {
        let payment_id = crate::payment_id::generate_payment_id(&params, namespace_salt);
        Self { payment_id, params }
    }

    /// Identifier the gateway stores this payment under.
    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    /// Amount in the token's smallest unit.
    pub fn amount(&self) -> U256 {
        self.params.amount
    }

    /// Token contract address, or [`NATIVE_TOKEN`].
    pub fn token_address(&self) -> Address {
        self.params.token_address
    }

    /// Address making the payment.
    pub fn payer(&self) -> Address {
        self.params.payer
    }

    /// Caller-defined metadata.
    pub fn metadata(&self) -> &str {
        &self.params.metadata
    }

    /// Returns true when paying in the chain's native currency.
    pub fn is_native(&self) -> bool {
        self.params.is_native()
    }

    /// The parameters without the identifier.
    pub fn pre_payment(&self) -> &PrePaymentParams {
        &self.params
    }
}

/// Kind of asset a payment moves, as encoded by the gateway contract.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    /// Chain's native currency
    #[default]
    Native,
    /// ERC-20 token
    Erc20,
}

impl TryFrom<u8> for TokenType {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TokenType::Native),
            1 => Ok(TokenType::Erc20),
            other => Err(GatewayError::InvalidPayload(format!(
                "Unknown token type: {}",
                other
            ))),
        }
    }
}

impl From<TokenType> for u8 {
    fn from(token_type: TokenType) -> Self {
        match token_type {
            TokenType::Native => 0,
            TokenType::Erc20 => 1,
        }
    }
}

/// Payment state as recorded by the gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Amount paid, in the token's smallest unit
    pub amount: U256,

    /// Identifier the payment was submitted under
    pub payment_id: PaymentId,

    /// Block at which the payment was recorded (zero if never recorded)
    pub payment_block: u64,

    /// Token contract address, or [`NATIVE_TOKEN`]
    pub token_address: Address,

    /// Kind of token the payment moved
    pub token_type: TokenType,

    /// Address that made the payment
    pub payer: Address,

    /// Caller-defined metadata
    pub metadata: String,

    /// Whether the gateway accepted and completed the payment
    pub processed: bool,
}

impl PaymentRecord {
    /// The record the gateway returns for an identifier it has never seen.
    pub fn not_found(payment_id: PaymentId) -> Self {
        Self {
            amount: U256::zero(),
            payment_id,
            payment_block: 0,
            token_address: Address::zero(),
            token_type: TokenType::Native,
            payer: Address::zero(),
            metadata: String::new(),
            processed: false,
        }
    }

    /// Returns true if this is the gateway's "unknown identifier" record.
    pub fn is_not_found(&self) -> bool {
        !self.processed && self.amount.is_zero() && self.payment_block == 0
    }
}

/// How many blocks must follow a payment's block before it counts as final.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", tag = "source", content = "blocks")]
pub enum ConfirmationPolicy {
    /// Locally configured depth; the gateway's own setting is never consulted
    Fixed(u64),
    /// Depth read from the gateway contract on each verification
    #[default]
    FromLedger,
}

impl ConfirmationPolicy {
    /// The fixed depth, if one is configured.
    pub fn fixed(&self) -> Option<u64> {
        match self {
            ConfirmationPolicy::Fixed(depth) => Some(*depth),
            ConfirmationPolicy::FromLedger => None,
        }
    }
}

impl From<Option<u64>> for ConfirmationPolicy {
    fn from(depth: Option<u64>) -> Self {
        depth.map_or(ConfirmationPolicy::FromLedger, ConfirmationPolicy::Fixed)
    }
}

/// Where a payment stands relative to its confirmation depth.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ConfirmationStatus {
    /// Unknown to the gateway, or recorded but not processed
    Pending,
    /// Processed, but fewer than `required` blocks have passed
    Confirming {
        /// Blocks elapsed since the payment block
        confirmations: u64,
        /// Confirmation depth in effect
        required: u64,
    },
    /// Processed and at least `required` blocks have passed
    Final {
        /// Blocks elapsed since the payment block
        confirmations: u64,
        /// Confirmation depth in effect
        required: u64,
    },
}

impl ConfirmationStatus {
    /// Returns true once the payment has reached its confirmation depth.
    pub fn is_final(&self) -> bool {
        matches!(self, ConfirmationStatus::Final { .. })
    }
}

/// Outcome of handing a payment to the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    /// Identifier the payment was submitted under
    pub payment_id: PaymentId,

    /// Hash of the payment transaction, when the ledger is a chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,

    /// Block the payment was included in, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

/// EIP-2612 permit signature authorising the gateway to pull tokens.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitSignature {
    /// Timestamp after which the permit is no longer valid
    pub deadline: U256,
    /// Recovery id
    pub v: u8,
    /// Signature R value
    pub r: [u8; 32],
    /// Signature S value
    pub s: [u8; 32],
}

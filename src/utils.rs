//! Utility functions for gateway operations.
//!
//! This module provides helpers for parsing user-supplied values and for
//! passing a created payment between services.

use crate::errors::{GatewayError, Result};
use crate::types::PaymentParams;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ethers::types::{Address, U256};
use std::str::FromStr;

/// Encodes a [`PaymentParams`] as Base64 JSON.
///
/// The merchant side creates the payment and hands this string to whoever
/// submits it, so both sides agree on the identifier.
///
/// # Examples
///
/// ```
/// use ethers::types::U256;
/// use opengateway_rs::types::{PaymentParams, PrePaymentParams};
/// use opengateway_rs::utils::{decode_payment_request, encode_payment_request};
///
/// let payer = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb".parse().unwrap();
/// let params = PaymentParams::new(
///     PrePaymentParams::native(U256::from(1000u64), payer, "order-42").unwrap(),
///     "app-1",
/// );
///
/// let encoded = encode_payment_request(&params).unwrap();
/// let decoded = decode_payment_request(&encoded).unwrap();
/// assert_eq!(decoded.payment_id(), params.payment_id());
/// ```
pub fn encode_payment_request(params: &PaymentParams) -> Result<String> {
    let json = serde_json::to_string(params)?;
    Ok(BASE64.encode(json.as_bytes()))
}

/// Decodes a Base64 JSON [`PaymentParams`] produced by [`encode_payment_request`].
pub fn decode_payment_request(encoded: &str) -> Result<PaymentParams> {
    let decoded = BASE64.decode(encoded.trim().as_bytes())?;
    let json_str = String::from_utf8(decoded)
        .map_err(|e| GatewayError::InvalidPayload(format!("Invalid UTF-8: {}", e)))?;
    let params: PaymentParams = serde_json::from_str(&json_str)?;
    Ok(params)
}

/// Converts a string representation of a uint256 to ethers U256.
///
/// # Arguments
///
/// * `s` - String representation of the number (can be decimal or hex with 0x prefix)
///
/// # Examples
///
/// ```
/// use opengateway_rs::utils::string_to_u256;
///
/// let value = string_to_u256("1000000").unwrap();
/// assert_eq!(value, 1000000u64.into());
///
/// let hex_value = string_to_u256("0x0f4240").unwrap();
/// assert_eq!(hex_value, 1000000u64.into());
/// ```
pub fn string_to_u256(s: &str) -> Result<U256> {
    let s = s.trim();

    if let Ok(value) = U256::from_dec_str(s) {
        return Ok(value);
    }

    if s.starts_with("0x") || s.starts_with("0X") {
        if let Ok(value) = U256::from_str(s) {
            return Ok(value);
        }
    }

    Err(GatewayError::InvalidAmount(format!("Cannot parse '{}' as U256", s)))
}

/// Validates and parses an Ethereum address.
///
/// # Arguments
///
/// * `addr` - The address string to validate (with or without 0x prefix)
///
/// # Examples
///
/// ```
/// use opengateway_rs::utils::parse_address;
///
/// let addr = parse_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").unwrap();
/// assert!(!addr.is_zero());
/// assert!(parse_address("0x1234").is_err());
/// ```
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr.trim())
        .map_err(|e| GatewayError::InvalidAddress(format!("{}: {}", addr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrePaymentParams;

    #[test]
    fn test_encode_decode_payment_request() {
        let pre = PrePaymentParams::parse(
            "250",
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb",
            "invoice #7",
        )
        .unwrap();
        let params = PaymentParams::new(pre, "shop");

        let encoded = encode_payment_request(&params).unwrap();
        let decoded = decode_payment_request(&encoded).unwrap();

        assert_eq!(decoded, params);
    }

    #[test]
    fn test_decode_payment_request_rejects_garbage() {
        assert!(matches!(
            decode_payment_request("not base64!"),
            Err(GatewayError::Base64Error(_))
        ));

        let not_json = BASE64.encode(b"hello");
        assert!(matches!(
            decode_payment_request(&not_json),
            Err(GatewayError::JsonError(_))
        ));
    }

    #[test]
    fn test_string_to_u256() {
        assert_eq!(string_to_u256("1000000").unwrap(), U256::from(1000000u64));
        assert_eq!(string_to_u256("0").unwrap(), U256::zero());
        assert_eq!(string_to_u256("0x0f4240").unwrap(), U256::from(1000000u64));
        assert!(string_to_u256("-1").is_err());
        assert!(string_to_u256("1.5").is_err());
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").unwrap();
        let addr2 = parse_address("742d35Cc6634C0532925a3b844Bc9e7595f0bEbb").unwrap();
        assert_eq!(addr, addr2);

        assert!(parse_address("invalid").is_err());
    }
}

//! Payment identifier generation.
//!
//! An identifier is the Keccak-256 digest of
//!
//! ```text
//! canonical(params) ‖ namespace_salt ‖ random(32 chars of [A-Za-z0-9])
//! ```
//!
//! The random suffix keeps identifiers unpredictable even when the parameters
//! and salt are guessable, so a third party cannot claim or front-run an
//! identifier before the payer submits it. Field order in the canonical
//! string is fixed: amount, tokenAddress, payer, metadata.

use crate::types::{PaymentId, PaymentParams, PrePaymentParams};
use ethers::utils::to_checksum;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha3::{Digest, Keccak256};

/// Length of the random suffix mixed into every identifier.
pub const RANDOM_SUFFIX_LEN: usize = 32;

/// Generates a fresh identifier for `params` scoped by `namespace_salt`.
///
/// Two calls with identical arguments return different identifiers.
///
/// # Examples
///
/// ```
/// use ethers::types::U256;
/// use opengateway_rs::payment_id::generate_payment_id;
/// use opengateway_rs::types::PrePaymentParams;
///
/// let payer = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb".parse().unwrap();
/// let params = PrePaymentParams::native(U256::from(1000u64), payer, "order-42").unwrap();
///
/// let a = generate_payment_id(&params, "app-1");
/// let b = generate_payment_id(&params, "app-1");
/// assert_ne!(a, b);
/// assert_eq!(a.to_string().len(), 66);
/// ```
pub fn generate_payment_id(params: &PrePaymentParams, namespace_salt: &str) -> PaymentId {
    let suffix = random_suffix(RANDOM_SUFFIX_LEN);
    derive_payment_id(params, namespace_salt, &suffix)
}

/// Creates [`PaymentParams`] by assigning a fresh identifier to `params`.
pub fn create_payment(params: PrePaymentParams, namespace_salt: &str) -> PaymentParams {
    PaymentParams::new(params, namespace_salt)
}

/// Deterministic string encoding of the payment parameters.
///
/// Addresses are rendered in EIP-55 checksum form so that the same address
/// typed in different letter cases canonicalises identically.
///
/// # Examples
///
/// ```
/// use ethers::types::U256;
/// use opengateway_rs::payment_id::canonical_params_string;
/// use opengateway_rs::types::PrePaymentParams;
///
/// let payer = "0x742d35cc6634c0532925a3b844bc9e7595f0bebb".parse().unwrap();
/// let params = PrePaymentParams::native(U256::from(1000u64), payer, "order-42").unwrap();
///
/// let canonical = canonical_params_string(&params);
/// assert!(canonical.starts_with(
///     "amount=1000, tokenAddress=0x0000000000000000000000000000000000000000, payer=0x"
/// ));
/// assert!(canonical.ends_with(", metadata=order-42"));
/// ```
pub fn canonical_params_string(params: &PrePaymentParams) -> String {
    format!(
        "amount={}, tokenAddress={}, payer={}, metadata={}",
        params.amount(),
        to_checksum(&params.token_address(), None),
        to_checksum(&params.payer(), None),
        params.metadata()
    )
}

fn derive_payment_id(params: &PrePaymentParams, namespace_salt: &str, suffix: &str) -> PaymentId {
    let mut hasher = Keccak256::new();
    hasher.update(canonical_params_string(params).as_bytes());
    hasher.update(namespace_salt.as_bytes());
    hasher.update(suffix.as_bytes());

    let mut digest = [0u8; PaymentId::LEN];
    digest.copy_from_slice(&hasher.finalize());
    PaymentId::from_bytes(digest)
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, U256};
    use ethers::utils::keccak256;
    use std::collections::HashSet;

    fn order_42() -> PrePaymentParams {
        let payer: Address = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEbb".parse().unwrap();
        PrePaymentParams::native(U256::from(1000u64), payer, "order-42").unwrap()
    }

    #[test]
    fn test_ten_thousand_ids_are_distinct() {
        let params = order_42();
        let ids: HashSet<PaymentId> = (0..10_000)
            .map(|_| generate_payment_id(&params, "app-1"))
            .collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_same_inputs_give_different_ids() {
        let params = order_42();
        assert_ne!(
            generate_payment_id(&params, "salt"),
            generate_payment_id(&params, "salt")
        );
    }

    #[test]
    fn test_id_is_32_bytes_and_66_chars() {
        let id = generate_payment_id(&order_42(), "");
        assert_eq!(id.as_bytes().len(), PaymentId::LEN);

        let text = id.to_string();
        assert_eq!(text.len(), 66);
        assert!(text.starts_with("0x"));
    }

    #[test]
    fn test_digest_covers_params_salt_and_suffix() {
        let params = order_42();
        let suffix = "A".repeat(RANDOM_SUFFIX_LEN);

        let expected = keccak256(format!("{}app-1{}", canonical_params_string(&params), suffix));
        assert_eq!(
            derive_payment_id(&params, "app-1", &suffix).to_bytes(),
            expected
        );

        assert_ne!(
            derive_payment_id(&params, "app-1", &suffix),
            derive_payment_id(&params, "app-2", &suffix)
        );
    }

    #[test]
    fn test_canonical_string_ignores_address_case() {
        let lower: Address = "0x742d35cc6634c0532925a3b844bc9e7595f0bebb".parse().unwrap();
        let a = PrePaymentParams::native(U256::from(1u64), lower, "x").unwrap();
        let b = order_42();
        assert!(canonical_params_string(&b).contains(&to_checksum(&lower, None)));
        assert_eq!(
            canonical_params_string(&a).split(", ").nth(2),
            canonical_params_string(&b).split(", ").nth(2)
        );
    }

    #[test]
    fn test_random_suffix_alphabet() {
        let suffix = random_suffix(RANDOM_SUFFIX_LEN);
        assert_eq!(suffix.len(), RANDOM_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_create_payment_keeps_params() {
        let params = create_payment(order_42(), "app-1");
        assert_eq!(params.amount(), U256::from(1000u64));
        assert!(params.is_native());
        assert_eq!(params.metadata(), "order-42");
    }

    #[test]
    fn test_generation_from_many_threads() {
        let params = order_42();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let params = params.clone();
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| generate_payment_id(&params, "app-1"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<PaymentId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 2_000);
    }
}

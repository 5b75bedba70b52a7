//! Token amount and address conversions.
//!
//! On-chain balances arrive as raw integer units. They are converted to whole
//! token units through BigDecimal so large holdings keep their precision.

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

use crate::chain::Chain;

// ============================================
// U256 Conversions
// ============================================

/// Convert a raw U256 amount to whole token units.
///
/// Returns `None` when the result is not a finite f64. Callers must treat
/// that as a failed lookup rather than a zero balance.
///
/// # Example
/// ```ignore
/// let value = U256::from(1_500_000_000_000_000_000u128);
/// assert_eq!(u256_to_token_amount(value, 18), Some(1.5));
/// ```
pub fn u256_to_token_amount(value: U256, decimals: u8) -> Option<f64> {
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let adjusted = BigDecimal::from(big_int) / big_pow10(decimals);

    adjusted.to_f64().filter(|v| v.is_finite())
}

// ============================================
// Addresses
// ============================================

/// Canonical form of an address for grouping and storage.
///
/// EVM addresses are case-insensitive (EIP-55 only adds a checksum), so they
/// are lowercased. Every other chain's encoding is case-sensitive.
pub fn normalize_address(chain: &Chain, address: &str) -> String {
    let trimmed = address.trim();
    if chain.is_evm() {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_string()
    }
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

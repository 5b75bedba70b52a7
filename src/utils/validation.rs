//! Sanitization bounds for values that feed the points formula.
//!
//! Providers and the pricing service are external inputs. A single bad row
//! (NaN, a negative balance, a price off by eighteen decimals) must not be
//! able to push a vault to the top of the leaderboard, so every value is
//! clamped to zero when it falls outside these bounds:
//!
//! 1. TOKEN PRICE: no legitimate token costs more than $1M per unit.
//!
//! 2. USD VALUE: a single vault holding or trading more than $100B on one
//!    chain is a conversion error.

// ============================================
// Validation Constants
// ============================================

/// Maximum reasonable token price in USD.
pub const MAX_TOKEN_USD_PRICE: f64 = 1e6;

/// Maximum reasonable USD value of a single metric (balance, LP, NFT, volume).
pub const MAX_VALUE_USD: f64 = 1e11;

// ============================================
// Validation Helpers
// ============================================

/// Token amount in whole units. Returns 0.0 if negative or not finite.
#[inline]
pub fn validate_amount(amount: f64) -> f64 {
    if amount >= 0.0 && amount.is_finite() {
        amount
    } else {
        0.0
    }
}

/// Validate a USD price is within reasonable bounds.
/// Returns the price if valid, 0.0 if invalid.
#[inline]
pub fn validate_usd_price(price: f64) -> f64 {
    if price > 0.0 && price.is_finite() && price <= MAX_TOKEN_USD_PRICE {
        price
    } else {
        0.0
    }
}

/// Validate a USD value (balance, LP, NFT, swap volume).
/// Returns the value if valid, 0.0 if invalid.
#[inline]
pub fn validate_usd_value(value: f64) -> f64 {
    if value >= 0.0 && value.is_finite() && value <= MAX_VALUE_USD {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(1.5), 1.5);
        assert_eq!(validate_amount(0.0), 0.0);
        assert_eq!(validate_amount(-3.0), 0.0);
        assert_eq!(validate_amount(f64::NAN), 0.0);
        assert_eq!(validate_amount(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_validate_usd_price() {
        assert_eq!(validate_usd_price(3500.0), 3500.0);
        assert_eq!(validate_usd_price(0.0), 0.0);
        assert_eq!(validate_usd_price(2e6), 0.0);
        assert_eq!(validate_usd_price(f64::NAN), 0.0);
    }

    #[test]
    fn test_validate_usd_value() {
        assert_eq!(validate_usd_value(1e9), 1e9);
        assert_eq!(validate_usd_value(0.0), 0.0);
        assert_eq!(validate_usd_value(1e12), 0.0);
        assert_eq!(validate_usd_value(-1.0), 0.0);
    }
}

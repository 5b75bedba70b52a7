//! Utility functions for the points engine.
//!
//! - [`validation`] - Sanitization bounds for points inputs
//! - [`conversion`] - Token amount conversions and address normalization

mod conversion;
mod validation;

// ============================================
// Re-exports
// ============================================

// Conversion utilities
pub use conversion::{normalize_address, u256_to_token_amount};

// Validation utilities
pub use validation::{
    validate_amount, validate_usd_price, validate_usd_value, MAX_TOKEN_USD_PRICE, MAX_VALUE_USD,
};

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// Coin registered on a vault (PostgreSQL)
///
/// Unique: (vault_id, chain, address, ticker)
/// The address was checked against the vault's derived address before the
/// coin was accepted, so workers can query it without re-deriving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: i64,
    pub vault_id: i64,
    pub chain: Chain,
    pub address: String,
    pub hex_public_key: String,
    pub ticker: String,
    pub contract_address: String,
    pub decimals: u8,
    pub is_native: bool,
}

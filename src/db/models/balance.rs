use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;

/// Token balance observation (PostgreSQL)
///
/// Append only: a newer observation for the same (vault, chain, token)
/// supersedes older rows instead of updating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub vault_id: i64,
    pub ecdsa: String,
    pub eddsa: String,
    pub chain: Chain,
    pub address: String,
    pub token: String,
    pub balance: f64,
    /// Unix seconds
    pub date: i64,
    pub price_id: Option<i64>,
}

/// Latest LP / NFT / swap-volume metrics reported for one chain address.
///
/// Append only, latest per (vault, chain) wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub vault_id: i64,
    pub chain: Chain,
    pub address: String,
    pub lp_value: f64,
    pub nft_value: f64,
    pub swap_volume: f64,
    /// Unix seconds
    pub date: i64,
}

/// Latest balance joined with the USD price it references.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedBalance {
    pub chain: Chain,
    pub token: String,
    pub balance: f64,
    pub price_usd: Option<f64>,
    pub date: i64,
}

/// Token to USD conversion record, maintained by the pricing service.
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub id: i64,
    pub chain: Chain,
    pub token: String,
    pub price_usd: f64,
    pub updated_at: i64,
}

/// Current unix timestamp in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

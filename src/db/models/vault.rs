use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ranking::display_name;

/// Registered vault (PostgreSQL)
///
/// Identity: (ecdsa, eddsa) public key pair
/// `id` is assigned in registration order and breaks ranking ties.
///
/// `total_points` and the aggregated metrics (`balance`, `lp_value`,
/// `nft_value`, `swap_volume`) are written only by the points worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: i64,
    pub ecdsa: String,
    pub eddsa: String,
    pub name: String,
    pub alias: String,
    pub uid: String,
    pub hex_chain_code: String,

    // Points state (current season)
    pub total_points: f64,
    pub join_airdrop: bool,
    pub current_season_id: u32,

    // Last aggregated metrics (USD)
    pub balance: f64,
    pub lp_value: f64,
    pub nft_value: f64,
    pub swap_volume: f64,

    // Profile
    pub referral_code: String,
    pub referral_count: i64,
    pub avatar_url: String,
    pub show_name_in_leaderboard: bool,

    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Name shown on public leaderboards.
    pub fn leaderboard_name(&self) -> String {
        let alias = if self.alias.is_empty() { &self.name } else { &self.alias };
        display_name(alias, &self.uid, self.show_name_in_leaderboard)
    }
}

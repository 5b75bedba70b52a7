use async_trait::async_trait;

use crate::{
    chain::Chain,
    db::models::{
        Balance, Coin, DeadLetter, PositionSnapshot, PricedBalance, SeasonStats, Vault,
    },
    worker::PointsBreakdown,
};

/// Aggregates over the vaults shown on a leaderboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaderTotals {
    pub vault_count: i64,
    pub total_points: f64,
    pub total_balance: f64,
    pub total_lp: f64,
    pub total_nft: f64,
    pub total_swap_volume: f64,
}

/// A vault together with its frozen stats for a closed season.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonLeader {
    pub vault: Vault,
    pub stats: SeasonStats,
}

/// Persistence operations consumed by the workers and the ranking engine.
///
/// Leaderboard reads only include vaults that joined the airdrop and are
/// ordered by points descending, then by `id` ascending (registration order).
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== VAULTS & COINS ====================

    async fn get_vault(&self, vault_id: i64) -> anyhow::Result<Option<Vault>>;

    async fn get_coins(&self, vault_id: i64) -> anyhow::Result<Vec<Coin>>;

    /// Ids of every vault that joined the airdrop
    async fn airdrop_vault_ids(&self) -> anyhow::Result<Vec<i64>>;

    // ==================== OBSERVATIONS ====================

    async fn insert_balances(&self, balances: &[Balance]) -> anyhow::Result<()>;

    async fn insert_positions(&self, positions: &[PositionSnapshot]) -> anyhow::Result<()>;

    async fn latest_price_id(&self, chain: &Chain, token: &str) -> anyhow::Result<Option<i64>>;

    /// Most recent balance per (chain, token) for the vault, joined with its price
    async fn latest_priced_balances(&self, vault_id: i64) -> anyhow::Result<Vec<PricedBalance>>;

    /// Most recent position snapshot per (chain, address) for the vault
    async fn latest_positions(&self, vault_id: i64) -> anyhow::Result<Vec<PositionSnapshot>>;

    // ==================== POINTS ====================

    async fn update_vault_points(
        &self,
        vault_id: i64,
        points: &PointsBreakdown,
    ) -> anyhow::Result<()>;

    // ==================== ACTIVE SEASON LEADERBOARD ====================

    async fn leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>>;

    async fn leader_totals(&self) -> anyhow::Result<LeaderTotals>;

    /// Airdrop vaults ordered by swap volume descending, then by `id`
    async fn swap_leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>>;

    /// 1-based leaderboard position, or 0 when the vault is not in the airdrop
    async fn vault_rank(&self, vault: &Vault) -> anyhow::Result<i64>;

    // ==================== CLOSED SEASONS ====================

    async fn leader_vaults_by_season(
        &self,
        season_id: u32,
        from: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<SeasonLeader>>;

    async fn leader_totals_by_season(&self, season_id: u32) -> anyhow::Result<LeaderTotals>;

    async fn season_stats(
        &self,
        vault_id: i64,
        season_id: u32,
    ) -> anyhow::Result<Option<SeasonStats>>;

    async fn has_season_stats(&self, season_id: u32) -> anyhow::Result<bool>;

    /// Freeze `stats` for `season_id` and move every vault still in that
    /// season (or an earlier one) to `next_season_id`, all or nothing.
    /// Returns the number of vaults moved.
    async fn close_season(
        &self,
        season_id: u32,
        stats: &[SeasonStats],
        next_season_id: u32,
    ) -> anyhow::Result<u64>;

    // ==================== TASKS ====================

    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> anyhow::Result<()>;
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use thiserror::Error;

use super::{
    allocation::{airdrop_pool, airdrop_share},
    order::{PageError, PageRequest},
};
use crate::db::{
    models::{SeasonCalendar, SeasonPhase, Vault},
    LeaderTotals, Store,
};

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("season {0} is not configured")]
    UnknownSeason(u32),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// One row of a leaderboard page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub vault_id: i64,
    pub name: String,
    pub avatar_url: String,
    pub total_points: f64,
    pub rank: i64,
    pub balance: f64,
    pub lp_value: f64,
    pub nft_value: f64,
    pub swap_volume: f64,
    pub registered_at: DateTime<Utc>,
    /// Allocated airdrop tokens, only for closed seasons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airdrop_share: Option<f64>,
}

impl LeaderboardEntry {
    fn from_vault(vault: &Vault, points: f64, rank: i64) -> Self {
        Self {
            vault_id: vault.id,
            name: vault.leaderboard_name(),
            avatar_url: vault.avatar_url.clone(),
            total_points: points,
            rank,
            balance: vault.balance,
            lp_value: vault.lp_value,
            nft_value: vault.nft_value,
            swap_volume: vault.swap_volume,
            registered_at: vault.created_at,
            airdrop_share: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardPage {
    pub season_id: u32,
    pub vaults: Vec<LeaderboardEntry>,
    pub total_vault_count: i64,
    pub total_points: f64,
    pub total_balance: f64,
    pub total_lp: f64,
    pub total_nft: f64,
}

impl LeaderboardPage {
    fn new(season_id: u32, totals: LeaderTotals, vaults: Vec<LeaderboardEntry>) -> Self {
        Self {
            season_id,
            vaults,
            total_vault_count: totals.vault_count,
            total_points: totals.total_points,
            total_balance: totals.total_balance,
            total_lp: totals.total_lp,
            total_nft: totals.total_nft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapVolumePage {
    pub vaults: Vec<LeaderboardEntry>,
    pub total_vault_count: i64,
    pub total_swap_volume: f64,
}

/// A vault's standing in one season.
///
/// For the season the vault is currently in, `points` is the running total
/// and `rank` its live position. For closed seasons both come from the frozen
/// snapshot and `airdrop_share` holds the allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonActivity {
    pub season_id: u32,
    pub rank: i64,
    pub points: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airdrop_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultDetail {
    pub vault_id: i64,
    pub name: String,
    pub total_points: f64,
    /// 0 when the vault has not joined the airdrop
    pub rank: i64,
    pub join_airdrop: bool,
    pub current_season_id: u32,
    pub balance: f64,
    pub lp_value: f64,
    pub nft_value: f64,
    pub swap_volume: f64,
    pub registered_at: DateTime<Utc>,
    pub season_activities: Vec<SeasonActivity>,
}

/// Read-only leaderboard queries over persisted totals.
///
/// Ranks on a page are positional, `from + offset + 1`, in the order the
/// store returns. Reads never wait on workers, they serve the latest
/// persisted state.
#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn Store>,
    calendar: Arc<SeasonCalendar>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn Store>, calendar: Arc<SeasonCalendar>) -> Self {
        Self { store, calendar }
    }

    pub async fn page(
        &self,
        from: i64,
        limit: i64,
        season_id: u32,
    ) -> Result<LeaderboardPage, LeaderboardError> {
        self.page_at(from, limit, season_id, Utc::now()).await
    }

    pub async fn page_at(
        &self,
        from: i64,
        limit: i64,
        season_id: u32,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardPage, LeaderboardError> {
        let request = PageRequest::new(from, limit)?;
        let phase = self
            .calendar
            .phase_at(season_id, now)
            .ok_or(LeaderboardError::UnknownSeason(season_id))?;

        match phase {
            SeasonPhase::Active => self.active_page(request, season_id).await,
            SeasonPhase::Closed => self.closed_page(request, season_id).await,
            SeasonPhase::Upcoming => Ok(LeaderboardPage::new(
                season_id,
                LeaderTotals::default(),
                Vec::new(),
            )),
        }
    }

    async fn active_page(
        &self,
        request: PageRequest,
        season_id: u32,
    ) -> Result<LeaderboardPage, LeaderboardError> {
        let totals = self.store.leader_totals().await?;
        let vaults = self.store.leader_vaults(request.from, request.limit).await?;

        let entries = vaults
            .iter()
            .enumerate()
            .map(|(i, vault)| LeaderboardEntry::from_vault(vault, vault.total_points, request.rank_at(i)))
            .collect();

        Ok(LeaderboardPage::new(season_id, totals, entries))
    }

    async fn closed_page(
        &self,
        request: PageRequest,
        season_id: u32,
    ) -> Result<LeaderboardPage, LeaderboardError> {
        let totals = self.store.leader_totals_by_season(season_id).await?;
        if totals.total_points <= 0.0 {
            warn!("Season {} closed with zero total points, every share is 0", season_id);
        }

        let pool = airdrop_pool(season_id);
        let leaders = self
            .store
            .leader_vaults_by_season(season_id, request.from, request.limit)
            .await?;

        let entries = leaders
            .iter()
            .enumerate()
            .map(|(i, leader)| {
                let mut entry =
                    LeaderboardEntry::from_vault(&leader.vault, leader.stats.points, request.rank_at(i));
                entry.airdrop_share = Some(airdrop_share(leader.stats.points, totals.total_points, pool));
                entry
            })
            .collect();

        Ok(LeaderboardPage::new(season_id, totals, entries))
    }

    /// Airdrop vaults ranked by swap volume.
    pub async fn swap_volume_page(
        &self,
        from: i64,
        limit: i64,
    ) -> Result<SwapVolumePage, LeaderboardError> {
        let request = PageRequest::new(from, limit)?;
        let totals = self.store.leader_totals().await?;
        let vaults = self.store.swap_leader_vaults(request.from, request.limit).await?;

        let entries = vaults
            .iter()
            .enumerate()
            .map(|(i, vault)| LeaderboardEntry::from_vault(vault, vault.total_points, request.rank_at(i)))
            .collect();

        Ok(SwapVolumePage {
            vaults: entries,
            total_vault_count: totals.vault_count,
            total_swap_volume: totals.total_swap_volume,
        })
    }

    /// Current standing of a vault and its history across seasons.
    pub async fn vault_detail(&self, vault_id: i64) -> Result<Option<VaultDetail>, LeaderboardError> {
        let Some(vault) = self.store.get_vault(vault_id).await? else {
            return Ok(None);
        };

        let rank = self.store.vault_rank(&vault).await?;
        let mut season_activities = Vec::new();

        for season in self.calendar.seasons() {
            if season.id == vault.current_season_id {
                season_activities.push(SeasonActivity {
                    season_id: season.id,
                    rank,
                    points: vault.total_points,
                    airdrop_share: None,
                });
                continue;
            }

            let Some(stats) = self.store.season_stats(vault.id, season.id).await? else {
                continue;
            };
            let totals = self.store.leader_totals_by_season(season.id).await?;
            if totals.total_points <= 0.0 {
                warn!("Season {} closed with zero total points, every share is 0", season.id);
            }

            season_activities.push(SeasonActivity {
                season_id: season.id,
                rank: stats.rank,
                points: stats.points,
                airdrop_share: Some(airdrop_share(
                    stats.points,
                    totals.total_points,
                    airdrop_pool(season.id),
                )),
            });
        }

        Ok(Some(VaultDetail {
            vault_id: vault.id,
            name: vault.leaderboard_name(),
            total_points: vault.total_points,
            rank,
            join_airdrop: vault.join_airdrop,
            current_season_id: vault.current_season_id,
            balance: vault.balance,
            lp_value: vault.lp_value,
            nft_value: vault.nft_value,
            swap_volume: vault.swap_volume,
            registered_at: vault.created_at,
            season_activities,
        }))
    }
}

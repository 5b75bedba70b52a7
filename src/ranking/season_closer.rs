use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;

use super::order::{compare_by_points, positional_rank, MAX_PAGE_SIZE};
use crate::db::{
    models::{SeasonCalendar, SeasonPhase, SeasonStats, Vault},
    Store,
};

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("season {0} is not configured")]
    UnknownSeason(u32),
    #[error("season {0} is still active")]
    StillActive(u32),
    #[error("season {0} has not started")]
    NotStarted(u32),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Closed { season_id: u32, vaults: usize, total_points: f64 },
    AlreadyClosed(u32),
}

/// Moves a season from Active to Closed.
///
/// Every airdrop vault whose points belong to the season is frozen into a
/// [`SeasonStats`] row with its positional rank, and the season's vaults move
/// on to the active season in the same write. Snapshots are written once and
/// never rewritten.
pub struct SeasonCloser {
    store: Arc<dyn Store>,
    calendar: Arc<SeasonCalendar>,
}

impl SeasonCloser {
    pub fn new(store: Arc<dyn Store>, calendar: Arc<SeasonCalendar>) -> Self {
        Self { store, calendar }
    }

    pub async fn close_season(
        &self,
        season_id: u32,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome, CloseError> {
        match self.calendar.phase_at(season_id, now) {
            None => return Err(CloseError::UnknownSeason(season_id)),
            Some(SeasonPhase::Active) => return Err(CloseError::StillActive(season_id)),
            Some(SeasonPhase::Upcoming) => return Err(CloseError::NotStarted(season_id)),
            Some(SeasonPhase::Closed) => {},
        }

        if self.store.has_season_stats(season_id).await? {
            return Ok(CloseOutcome::AlreadyClosed(season_id));
        }

        let leaders = self.collect_leaders(season_id).await?;
        let stats: Vec<SeasonStats> = leaders
            .iter()
            .enumerate()
            .map(|(i, vault)| SeasonStats {
                vault_id: vault.id,
                season_id,
                points: vault.total_points,
                rank: positional_rank(0, i),
            })
            .collect();
        let total_points: f64 = stats.iter().map(|s| s.points).sum();

        // Stats and the season move commit together, so a failed close leaves
        // no snapshot behind and the next run starts over
        let active = self.calendar.active_at(now).id;
        let advanced = self.store.close_season(season_id, &stats, active).await?;

        info!(
            "Season {} closed: {} vault(s), {:.2} total points, {} vault(s) moved to season {}",
            season_id,
            stats.len(),
            total_points,
            advanced,
            active
        );

        Ok(CloseOutcome::Closed {
            season_id,
            vaults: stats.len(),
            total_points,
        })
    }

    /// Close every finished season that has no snapshot yet, oldest first.
    pub async fn close_finished(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<CloseOutcome>> {
        let mut outcomes = Vec::new();
        for season in self.calendar.closed_at(now) {
            match self.close_season(season.id, now).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(CloseError::Store(e)) => return Err(e.context(format!("Closing season {}", season.id))),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(outcomes)
    }

    /// Walk the ordered leaderboard page by page. Vaults whose points moved
    /// between pages may show up twice, so the result is deduplicated and
    /// re-sorted.
    async fn collect_leaders(&self, season_id: u32) -> anyhow::Result<Vec<Vault>> {
        let mut by_id: BTreeMap<i64, Vault> = BTreeMap::new();
        let mut from = 0;
        loop {
            let page = self.store.leader_vaults(from, MAX_PAGE_SIZE).await?;
            let fetched = page.len() as i64;
            for vault in page.into_iter().filter(|v| v.current_season_id == season_id) {
                by_id.insert(vault.id, vault);
            }
            if fetched < MAX_PAGE_SIZE {
                break;
            }
            from += fetched;
        }

        let mut leaders: Vec<Vault> = by_id.into_values().collect();
        leaders.sort_by(|a, b| compare_by_points(a.total_points, a.id, b.total_points, b.id));
        Ok(leaders)
    }
}

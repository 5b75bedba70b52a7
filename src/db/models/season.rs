use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SeasonSettings;

/// Airdrop season window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&SeasonSettings> for Season {
    fn from(value: &SeasonSettings) -> Self {
        Self {
            id: value.id,
            start: value.start,
            end: value.end,
        }
    }
}

/// Per (vault, season) snapshot written when a season closes (PostgreSQL)
///
/// Primary Key: (vault_id, season_id)
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonStats {
    pub vault_id: i64,
    pub season_id: u32,
    pub points: f64,
    pub rank: i64,
}

/// Lifecycle of a season relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonPhase {
    Active,
    Closed,
    Upcoming,
}

/// Configured seasons, ordered by start.
///
/// Exactly one season is active at any instant: the one whose window
/// contains it, else the latest season already started, else the first one.
#[derive(Debug, Clone)]
pub struct SeasonCalendar {
    seasons: Vec<Season>,
}

impl SeasonCalendar {
    pub fn new(mut seasons: Vec<Season>) -> anyhow::Result<Self> {
        if seasons.is_empty() {
            anyhow::bail!("Season calendar needs at least one season");
        }
        seasons.sort_by_key(|s| s.start);
        Ok(Self { seasons })
    }

    pub fn from_settings(settings: &[SeasonSettings]) -> anyhow::Result<Self> {
        Self::new(settings.iter().map(Season::from).collect())
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn get(&self, id: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.id == id)
    }

    pub fn active_at(&self, now: DateTime<Utc>) -> &Season {
        if let Some(season) = self.seasons.iter().find(|s| s.start <= now && now < s.end) {
            return season;
        }
        self.seasons
            .iter()
            .rev()
            .find(|s| s.start <= now)
            .unwrap_or(&self.seasons[0])
    }

    pub fn active(&self) -> &Season {
        self.active_at(Utc::now())
    }

    pub fn phase_at(&self, id: u32, now: DateTime<Utc>) -> Option<SeasonPhase> {
        let season = self.get(id)?;
        let phase = if self.active_at(now).id == id {
            SeasonPhase::Active
        } else if season.end <= now {
            SeasonPhase::Closed
        } else {
            SeasonPhase::Upcoming
        };
        Some(phase)
    }

    /// Seasons that have ended and are no longer active.
    pub fn closed_at(&self, now: DateTime<Utc>) -> Vec<&Season> {
        let active = self.active_at(now).id;
        self.seasons
            .iter()
            .filter(|s| s.id != active && s.end <= now)
            .collect()
    }
}

//! Airdrop allocation for closed seasons.
//!
//! share(vault, season) = points / total_season_points * airdrop_pool(season)

/// Tokens distributed for the first season.
pub const FIRST_SEASON_POOL: f64 = 1_000_000.0;

/// Tokens distributed for every later season.
pub const SEASON_POOL: f64 = 1_250_000.0;

/// Fixed airdrop pool of a season.
pub fn airdrop_pool(season_id: u32) -> f64 {
    if season_id == 0 {
        FIRST_SEASON_POOL
    } else {
        SEASON_POOL
    }
}

/// Proportional share of `pool` for `points` out of `total_points`.
///
/// Returns 0 when nobody earned points in the season.
pub fn airdrop_share(points: f64, total_points: f64, pool: f64) -> f64 {
    if total_points > 0.0 && points.is_finite() && points > 0.0 {
        points / total_points * pool
    } else {
        0.0
    }
}

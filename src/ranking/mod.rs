//! Leaderboard ordering, pagination and season airdrop allocation.

mod allocation;
mod leaderboard;
mod order;
mod season_closer;

pub use allocation::{airdrop_pool, airdrop_share, FIRST_SEASON_POOL, SEASON_POOL};
pub use leaderboard::{
    Leaderboard, LeaderboardEntry, LeaderboardError, LeaderboardPage, SeasonActivity,
    SwapVolumePage, VaultDetail,
};
pub use order::{
    compare_by_points, display_name, positional_rank, PageError, PageRequest, MASKED_NAME_LEN,
    MAX_PAGE_SIZE,
};
pub use season_closer::{CloseError, CloseOutcome, SeasonCloser};

use std::cmp::Ordering;

use thiserror::Error;

/// Largest page a leaderboard query may return.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Number of UID characters shown for vaults that hide their name.
pub const MASKED_NAME_LEN: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page offset must not be negative, got {0}")]
    NegativeOffset(i64),
    #[error("page limit must be at least 1, got {0}")]
    EmptyLimit(i64),
}

/// Validated `(from, limit)` window over an ordered leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub from: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Limits above [`MAX_PAGE_SIZE`] are clamped rather than rejected.
    pub fn new(from: i64, limit: i64) -> Result<Self, PageError> {
        if from < 0 {
            return Err(PageError::NegativeOffset(from));
        }
        if limit < 1 {
            return Err(PageError::EmptyLimit(limit));
        }
        Ok(Self {
            from,
            limit: limit.min(MAX_PAGE_SIZE),
        })
    }

    /// Rank of the entry at `offset` within this page.
    pub fn rank_at(&self, offset: usize) -> i64 {
        positional_rank(self.from, offset)
    }
}

/// Rank is positional in the current sort order: `from + offset + 1`.
#[inline]
pub fn positional_rank(from: i64, offset: usize) -> i64 {
    from + offset as i64 + 1
}

/// Leaderboard order: points descending, then registration order.
pub fn compare_by_points(a_points: f64, a_id: i64, b_points: f64, b_id: i64) -> Ordering {
    b_points.total_cmp(&a_points).then(a_id.cmp(&b_id))
}

/// Leaderboard display name.
///
/// Vaults that hide their name show the first [`MASKED_NAME_LEN`]
/// characters of their UID (the whole UID when shorter).
pub fn display_name(alias: &str, uid: &str, show_name: bool) -> String {
    if show_name {
        alias.to_string()
    } else {
        uid.chars().take(MASKED_NAME_LEN).collect()
    }
}

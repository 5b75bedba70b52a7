use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task that exhausted its retries or could never succeed (PostgreSQL)
///
/// Kept for operator inspection; never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task_id: u64,
    pub kind: String,
    pub vault_id: i64,
    pub attempts: u32,
    pub error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

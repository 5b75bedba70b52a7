use std::sync::Arc;

use crate::config::Settings;

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod postgres;
mod store;

pub use postgres::PostgresClient;
pub use store::{LeaderTotals, SeasonLeader, Store};

/// Database handle shared by the workers, the scheduler and the leaderboard.
///
/// PostgreSQL holds every record: vaults, coins, balance observations,
/// prices, closed season snapshots and dead-lettered tasks.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    /// Connect and apply the schema.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;
        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }

    /// The store as seen by the workers and the ranking engine.
    pub fn store(&self) -> Arc<dyn Store> {
        self.postgres.clone()
    }
}

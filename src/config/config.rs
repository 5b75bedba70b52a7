use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use config::{Config, File};
use serde::Deserialize;

use crate::chain::Chain;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Vaults and their registered coins
/// - Balance and position observations
/// - Prices (maintained by the pricing service)
/// - Closed season snapshots and dead-lettered tasks
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Task queue and worker pool configuration.
///
/// Queue weights mirror the dispatch ratio between the critical, default
/// and low priority classes when every class has work waiting.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_weights")]
    pub queue_weights: [u32; 3],
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_milliseconds: u64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
    /// Upper bound for a whole task, retried on expiry
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Upper bound for a single chain lookup
    #[serde(default = "default_chain_timeout_secs")]
    pub chain_timeout_secs: u64,
    /// Concurrent chain lookups within one balance fetch
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,
}

fn default_concurrency() -> usize {
    10
}

fn default_queue_weights() -> [u32; 3] {
    [6, 3, 1]
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_secs() -> u64 {
    300
}

fn default_task_timeout_secs() -> u64 {
    180
}

fn default_chain_timeout_secs() -> u64 {
    30
}

fn default_max_fanout() -> usize {
    8
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_weights: default_queue_weights(),
            max_retries: default_max_retries(),
            retry_base_milliseconds: default_retry_base_ms(),
            retry_max_secs: default_retry_max_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            chain_timeout_secs: default_chain_timeout_secs(),
            max_fanout: default_max_fanout(),
        }
    }
}

/// Weights applied to the aggregated vault metrics when computing points.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PointsSettings {
    #[serde(default = "default_weight")]
    pub balance_weight: f64,
    #[serde(default = "default_weight")]
    pub lp_weight: f64,
    #[serde(default = "default_weight")]
    pub nft_weight: f64,
    #[serde(default = "default_weight")]
    pub swap_volume_weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for PointsSettings {
    fn default() -> Self {
        Self {
            balance_weight: default_weight(),
            lp_weight: default_weight(),
            nft_weight: default_weight(),
            swap_volume_weight: default_weight(),
        }
    }
}

/// One airdrop season window, `[start, end)`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeasonSettings {
    pub id: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// ERC-20 token tracked on an EVM chain.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackedTokenSettings {
    pub ticker: String,
    pub address: String,
    pub decimals: u8,
}

/// RPC endpoint used to read balances on one EVM chain.
#[derive(Debug, Deserialize, Clone)]
pub struct EvmChainSettings {
    pub chain: Chain,
    pub rpc_url: String,
    pub native_ticker: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    #[serde(default)]
    pub tokens: Vec<TrackedTokenSettings>,
}

fn default_native_decimals() -> u8 {
    18
}

/// Intervals for periodic background jobs.
#[derive(Debug, Deserialize, Clone)]
pub struct CronSettings {
    /// Interval for re-enqueuing balance fetches of every airdrop vault
    #[serde(default = "default_refresh_balances_secs")]
    pub refresh_balances_interval_secs: u64,
    /// Interval for closing seasons whose window has ended
    #[serde(default = "default_close_seasons_secs")]
    pub close_seasons_interval_secs: u64,
}

fn default_refresh_balances_secs() -> u64 {
    6 * 3600
}

fn default_close_seasons_secs() -> u64 {
    3600
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            refresh_balances_interval_secs: default_refresh_balances_secs(),
            close_seasons_interval_secs: default_close_seasons_secs(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub points: PointsSettings,
    pub seasons: Vec<SeasonSettings>,
    #[serde(default)]
    pub evm: Vec<EvmChainSettings>,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s
            .try_deserialize()
            .context("Failed to deserialize settings")?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.seasons.is_empty() {
            bail!("At least one season must be configured");
        }

        for (i, season) in self.seasons.iter().enumerate() {
            if season.start >= season.end {
                bail!("Season {} must start before it ends", season.id);
            }
            if self.seasons[..i].iter().any(|s| s.id == season.id) {
                bail!("Season id {} is configured twice", season.id);
            }
        }

        if self.worker.concurrency == 0 {
            bail!("worker.concurrency must be at least 1");
        }
        if self.worker.queue_weights.iter().all(|w| *w == 0) {
            bail!("worker.queue_weights must not all be zero");
        }

        for evm in &self.evm {
            if !evm.chain.is_evm() {
                bail!("{} is not an EVM chain", evm.chain);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(yaml: &str) -> anyhow::Result<Settings> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    const BASE: &str = r#"
postgres:
  host: localhost
  port: 5432
  user: airdrop
  password: secret
  database: airdrop
seasons:
  - id: 0
    start: "2024-01-01T00:00:00Z"
    end: "2024-07-01T00:00:00Z"
  - id: 1
    start: "2024-07-01T00:00:00Z"
    end: "2025-01-01T00:00:00Z"
"#;

    #[test]
    fn test_defaults_applied() {
        let settings = parse(BASE).unwrap();
        assert_eq!(settings.worker.concurrency, 10);
        assert_eq!(settings.worker.queue_weights, [6, 3, 1]);
        assert_eq!(settings.points, PointsSettings::default());
        assert_eq!(settings.postgres.pool_size, 16);
        assert_eq!(settings.seasons.len(), 2);
        assert!(settings.evm.is_empty());
    }

    #[test]
    fn test_evm_chain_parsed_by_identifier() {
        let yaml = format!(
            "{}\nevm:\n  - chain: BSC\n    rpc_url: http://localhost:8545\n    native_ticker: BNB\n",
            BASE
        );
        let settings = parse(&yaml).unwrap();
        assert_eq!(settings.evm[0].chain, Chain::Bsc);
        assert_eq!(settings.evm[0].native_decimals, 18);
    }

    #[test]
    fn test_rejects_non_evm_rpc_chain() {
        let yaml = format!(
            "{}\nevm:\n  - chain: Solana\n    rpc_url: http://localhost:8899\n    native_ticker: SOL\n",
            BASE
        );
        assert!(parse(&yaml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_season() {
        let yaml = BASE.replace("id: 1", "id: 0");
        assert!(parse(&yaml).is_err());
    }
}

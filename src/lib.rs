pub mod abis;
pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod queue;
pub mod ranking;
pub mod utils;
pub mod worker;

pub use chain::Chain;
pub use config::Settings;
pub use cron::CronScheduler;
pub use db::{Database, Store};
pub use queue::{TaskQueue, WorkerPool};
pub use ranking::Leaderboard;
pub use worker::{BalanceFetcher, PointsCalculator, TaskDispatcher};

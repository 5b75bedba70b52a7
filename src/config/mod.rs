mod config;

pub use config::{
    CronSettings, EvmChainSettings, PointsSettings, PostgresSettings, SeasonSettings, Settings,
    TrackedTokenSettings, WorkerSettings,
};

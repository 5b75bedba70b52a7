//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Re-enqueuing balance fetches for every airdrop vault
//! - Closing seasons whose window has ended

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use super::jobs;
use crate::{config::CronSettings, db::Store, queue::TaskQueue, ranking::SeasonCloser};

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    store: Arc<dyn Store>,
    queue: Arc<TaskQueue>,
    closer: Arc<SeasonCloser>,
    settings: CronSettings,
}

impl CronScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<TaskQueue>,
        closer: Arc<SeasonCloser>,
        settings: CronSettings,
    ) -> Self {
        Self {
            store,
            queue,
            closer,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_refresh_balances_job(&scheduler).await?;
        self.register_close_seasons_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_refresh_balances_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let store = self.store.clone();
        let queue = self.queue.clone();
        let interval = self.settings.refresh_balances_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let store = store.clone();
            let queue = queue.clone();
            Box::pin(async move {
                if let Err(e) = jobs::refresh_balances::run(store.as_ref(), &queue).await {
                    error!("Failed to refresh balances: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered refresh_balances job (every {}s)", interval);
        Ok(())
    }

    async fn register_close_seasons_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let closer = self.closer.clone();
        let interval = self.settings.close_seasons_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let closer = closer.clone();
            Box::pin(async move {
                if let Err(e) = jobs::close_seasons::run(&closer).await {
                    error!("Failed to close seasons: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered close_seasons job (every {}s)", interval);
        Ok(())
    }

    /// Run every job once, outside the schedule.
    pub async fn run_once(&self) {
        if let Err(e) = jobs::close_seasons::run(&self.closer).await {
            error!("Failed to close seasons: {:#}", e);
        }
        if let Err(e) = jobs::refresh_balances::run(self.store.as_ref(), &self.queue).await {
            error!("Failed to refresh balances: {:#}", e);
        }
    }
}

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use airdrop_points::{
    db::models::SeasonCalendar,
    queue::{RetryPolicy, TaskQueue, WorkerPool},
    ranking::SeasonCloser,
    worker::{
        BalanceFetcher, BalanceGateway, EvmBalanceProvider, PointsCalculator, PointsWeights,
        TaskDispatcher,
    },
    CronScheduler, Database, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Database::new(&settings)
        .await
        .context("Failed to initialize database connection")?;

    run_engine(settings, db).await
}

fn build_gateway(settings: &Settings) -> anyhow::Result<BalanceGateway> {
    let mut gateway = BalanceGateway::new();
    for evm in &settings.evm {
        let provider = EvmBalanceProvider::new(evm)?;
        gateway.register(evm.chain.clone(), Arc::new(provider));
        info!(
            "Registered EVM balance provider for {} ({} tracked token(s))",
            evm.chain,
            evm.tokens.len()
        );
    }
    Ok(gateway)
}

async fn run_engine(settings: Arc<Settings>, db: Database) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();
    let store = db.store();

    let calendar = Arc::new(SeasonCalendar::from_settings(&settings.seasons)?);
    info!("Active season: {}", calendar.active().id);

    let gateway = Arc::new(build_gateway(&settings)?);
    let queue = Arc::new(TaskQueue::new(
        settings.worker.queue_weights,
        RetryPolicy::from_settings(&settings.worker),
    ));

    let fetcher = BalanceFetcher::new(store.clone(), gateway, queue.clone(), &settings.worker);
    let points = PointsCalculator::new(store.clone(), PointsWeights::from(&settings.points));
    let dispatcher = Arc::new(TaskDispatcher::new(fetcher, points));

    let pool = WorkerPool::start(
        queue.clone(),
        dispatcher,
        store.clone(),
        settings.worker.concurrency,
        Duration::from_secs(settings.worker.task_timeout_secs),
        cancellation_token.child_token(),
    );

    let closer = Arc::new(SeasonCloser::new(store.clone(), calendar.clone()));
    let cron_scheduler = Arc::new(CronScheduler::new(
        store.clone(),
        queue.clone(),
        closer,
        settings.cron.clone(),
    ));

    // Catch up on seasons that ended while the service was down
    cron_scheduler.run_once().await;

    let cron_token = cancellation_token.child_token();
    let cron = cron_scheduler.clone();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Points engine running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing in-flight tasks...");
    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    pool.shutdown().await;

    info!("Points engine stopped");
    Ok(())
}

//! ChannelGate Background Worker
//!
//! Runs the external-access side of the engine:
//! - Grant queue consumer (concurrency 4)
//! - Revoke queue consumer (concurrency 2)
//! - Expired-entitlements sweep (hourly)
//! - Expired-channel-access sweep (hourly)
//! - Grace-period expiry sweep (hourly)
//! - Completed-job purge (daily at 3:00 AM UTC)

mod consumer;

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{error, info};

use channelgate_access::{AccessService, GRANT_QUEUE, REVOKE_QUEUE};
use channelgate_shared::create_pool;

/// Completed queue jobs are kept this long for inspection
const JOB_RETENTION_DAYS: i32 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting ChannelGate Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    // The database may still be coming up when the worker starts; retry
    // before giving up
    let retry_strategy = FixedInterval::from_millis(2_000).take(10);
    let pool = Retry::spawn(retry_strategy, || create_pool(&database_url)).await?;
    info!("Database pool created");

    let access = AccessService::from_env(pool.clone())?;

    // Queue consumers: grant is chattier, revoke makes more API calls per job
    let grant_queue = access.queue.clone();
    let grant_executor = access.executor.clone();
    tokio::spawn(async move {
        consumer::run_consumer(grant_queue, grant_executor, GRANT_QUEUE, 4).await;
    });

    let revoke_queue = access.queue.clone();
    let revoke_executor = access.executor.clone();
    tokio::spawn(async move {
        consumer::run_consumer(revoke_queue, revoke_executor, REVOKE_QUEUE, 2).await;
    });

    let scheduler = JobScheduler::new().await?;

    // Job 1: Expired entitlements (hourly at :05)
    let sweeps = access.sweeps.clone();
    scheduler
        .add(Job::new_async("0 5 * * * *", move |_uuid, _l| {
            let sweeps = sweeps.clone();
            Box::pin(async move {
                info!("Running expired-entitlements sweep");
                if let Err(e) = sweeps.expire_entitlements().await {
                    error!(error = %e, "Expired-entitlements sweep failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Expired entitlements sweep (hourly)");

    // Job 2: Expired channel access (hourly at :10)
    let sweeps = access.sweeps.clone();
    scheduler
        .add(Job::new_async("0 10 * * * *", move |_uuid, _l| {
            let sweeps = sweeps.clone();
            Box::pin(async move {
                info!("Running expired-channel-access sweep");
                if let Err(e) = sweeps.expire_channel_access().await {
                    error!(error = %e, "Expired-channel-access sweep failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Expired channel access sweep (hourly)");

    // Job 3: Grace-period expiry (hourly at :15)
    let sweeps = access.sweeps.clone();
    scheduler
        .add(Job::new_async("0 15 * * * *", move |_uuid, _l| {
            let sweeps = sweeps.clone();
            Box::pin(async move {
                info!("Running grace-expiry sweep");
                if let Err(e) = sweeps.expire_grace_periods().await {
                    error!(error = %e, "Grace-expiry sweep failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Grace-period expiry sweep (hourly)");

    // Job 4: Purge old completed jobs (daily at 3:00 AM UTC)
    let sweeps = access.sweeps.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let sweeps = sweeps.clone();
            Box::pin(async move {
                info!("Running completed-job purge");
                if let Err(e) = sweeps.purge_completed_jobs(JOB_RETENTION_DAYS).await {
                    error!(error = %e, "Completed-job purge failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Completed-job purge (daily at 3:00 AM)");

    // Job 5: Heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat");
            })
        })?)
        .await?;

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("ChannelGate Worker started");

    // Consumers and scheduled jobs run in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

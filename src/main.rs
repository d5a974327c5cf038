use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use squares_engine::api::{HttpFetcher, ScoreSources};
use squares_engine::config::Config;
use squares_engine::db::{self, ActivityLogStore, ActivitySink, ContestStore, ScoreStore};
use squares_engine::settlement::SettlementEngine;
use squares_engine::workers::{
    ActiveContestSweeper, ContestRefresher, QueueHeartbeat, RefreshScheduler, RetryPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "squares_engine=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting squares-engine");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Initialize database
    let pool = db::connect(&config.database_url).await?;
    let contests = ContestStore::new(pool.clone());
    let scores = ScoreStore::new(pool.clone());
    let activity: Arc<dyn ActivitySink> = Arc::new(ActivityLogStore::new(pool));

    // Initialize score sources
    let http = HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))?;
    let sources = ScoreSources::new(http, &config.espn_api_base_url);
    info!("Score sources initialized");

    let engine = Arc::new(SettlementEngine::new(
        contests.clone(),
        scores,
        Arc::clone(&activity),
    ));

    let refresher = Arc::new(ContestRefresher::new(
        contests.clone(),
        sources,
        engine,
        Arc::clone(&activity),
        RetryPolicy::from_config(&config),
    ));

    let scheduler = RefreshScheduler::new(refresher, contests.clone());
    let queued = scheduler.schedule_upcoming().await?;
    info!("Queued kickoff refresh for {} upcoming contest(s)", queued);

    // Create workers
    let heartbeat = Arc::new(QueueHeartbeat::new(
        Arc::clone(&activity),
        config.heartbeat_stale_secs,
    ));

    let sweeper = ActiveContestSweeper::new(
        contests,
        Arc::clone(&scheduler),
        Arc::clone(&heartbeat),
        config.active_sweep_interval,
    );

    info!("Workers created, starting...");

    // Spawn workers
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run().await;
    });

    let watchdog_interval = Duration::from_secs(config.active_sweep_interval.max(1));
    let watchdog_handle = tokio::spawn(async move {
        heartbeat.run(watchdog_interval).await;
    });

    info!("All workers started");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = sweeper_handle => {
            error!("Active contest sweeper exited unexpectedly: {:?}", result);
        }
        result = watchdog_handle => {
            error!("Heartbeat watchdog exited unexpectedly: {:?}", result);
        }
    }

    info!("Shutting down squares-engine");
    Ok(())
}

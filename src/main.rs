//! # Sentinel Jobs Entry Point
//!
//! Loads configuration, prepares storage, registers the maintenance jobs and
//! serves the operator API until interrupted.

use std::sync::Arc;

use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use sentinel_jobs::{
    config::ConfigLoader,
    db,
    jobs::{self, JobDeps},
    media_cache::MediaCache,
    media_detector::MediaDetector,
    platform::DiscordClient,
    scheduler::JobScheduler,
    server::{AppState, run_server},
    telemetry,
    trigger::SystemClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        info!(config = %redacted, "Effective configuration");
    }

    let db = db::init_pool(&config).await?;
    Migrator::up(&db, None)
        .await
        .context("failed to apply database migrations")?;

    let cache = MediaCache::new(config.media_cache_dir.clone());
    cache
        .ensure_directories()
        .await
        .with_context(|| format!("failed to prepare media cache at {:?}", cache.root()))?;

    let token = match config.discord_token.clone() {
        Some(token) => token,
        None => {
            warn!("SENTINEL_DISCORD_TOKEN is not set; platform requests will be rejected");
            String::new()
        }
    };
    let platform = Arc::new(DiscordClient::new(&config.discord_api_base, token)?);
    let clock = Arc::new(SystemClock);

    let mut scheduler = JobScheduler::new(clock.clone());
    jobs::register_all(
        &mut scheduler,
        &config.jobs,
        JobDeps {
            db: db.clone(),
            platform,
            clock,
            cache,
            detector: Arc::new(MediaDetector::new()?),
        },
    )?;
    let scheduler = Arc::new(scheduler);
    let scheduler_handle = Arc::clone(&scheduler).start();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!(error = %err, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    let state = AppState {
        config: Arc::new(config),
        db,
        scheduler,
    };
    let served = run_server(state, shutdown.clone()).await;

    // Let in-flight runs finish before exiting.
    shutdown.cancel();
    scheduler_handle.stop().await;

    served.map_err(|err| anyhow::anyhow!(err))
}

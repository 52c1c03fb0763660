//! # Maintenance Jobs
//!
//! Every background task implements [`Job`]. The scheduler owns triggering
//! and overlap control; a job only performs one bounded unit of work per
//! invocation and reports what it did.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::media_cache::MediaCache;
use crate::media_detector::MediaDetector;
use crate::platform::{PlatformClient, PlatformError};
use crate::repositories::checkpoint::CheckpointError;
use crate::retention::RetentionEngine;
use crate::scheduler::{JobScheduler, SchedulerError};
use crate::trigger::{Clock, Trigger, TriggerParseError};

pub mod history_scan;
pub mod media_scan;
pub mod retention;
pub mod user_sync;

pub use history_scan::{HistoryScanJob, HistoryScanLimits};
pub use media_scan::MediaScanJob;
pub use retention::RetentionJob;
pub use user_sync::UserSyncJob;

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Schedule,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Schedule => f.write_str("schedule"),
            TriggerSource::Manual => f.write_str("manual"),
        }
    }
}

/// Per-invocation context handed to [`Job::run`].
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: Uuid,
    pub triggered_by: TriggerSource,
    pub started_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(triggered_by: TriggerSource, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            triggered_by,
            started_at,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct JobReport {
    /// Items examined (messages, members, rows)
    pub items_processed: u64,
    /// Items written or removed
    pub items_affected: u64,
    /// Sub-resources that failed and were skipped
    pub items_failed: u64,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job failed: {message}")]
    Failed { message: String },
}

#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identifier used in configuration, metrics and the operator API.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn run(&self, ctx: &JobContext) -> Result<JobReport, JobError>;
}

/// Log a storage failure with context before surfacing it as a job error.
pub(crate) fn map_db_err(context: &'static str, err: DbErr) -> JobError {
    error!(error = ?err, context, "Database operation failed");
    JobError::Database(err)
}

/// Shared resources the jobs are built from.
#[derive(Clone)]
pub struct JobDeps {
    pub db: sea_orm::DatabaseConnection,
    pub platform: Arc<dyn PlatformClient>,
    pub clock: Arc<dyn Clock>,
    pub cache: MediaCache,
    pub detector: Arc<MediaDetector>,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid trigger for job {job}: {source}")]
    Trigger {
        job: String,
        #[source]
        source: TriggerParseError,
    },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Build every maintenance job and register it with its configured trigger.
pub fn register_all(
    scheduler: &mut JobScheduler,
    config: &JobsConfig,
    deps: JobDeps,
) -> Result<(), RegistrationError> {
    let engine = RetentionEngine::new(deps.db.clone(), deps.cache.clone());

    let jobs: Vec<Arc<dyn Job>> = vec![
        Arc::new(UserSyncJob::new(
            deps.db.clone(),
            deps.platform.clone(),
            deps.clock.clone(),
        )),
        Arc::new(MediaScanJob::new(
            deps.db.clone(),
            deps.detector.clone(),
            deps.platform.clone(),
            deps.cache.clone(),
            deps.clock.clone(),
            config.media_scan_batch_size,
        )),
        Arc::new(HistoryScanJob::new(
            deps.db.clone(),
            deps.detector.clone(),
            deps.platform.clone(),
            deps.clock.clone(),
            HistoryScanLimits::from(config),
        )),
        Arc::new(RetentionJob::log_retention(
            engine.clone(),
            config,
            deps.clock.clone(),
        )),
        Arc::new(RetentionJob::cache_eviction(engine, config, deps.clock)),
    ];

    for job in jobs {
        let settings = config.settings(job.name());
        let trigger: Trigger =
            settings
                .trigger
                .parse()
                .map_err(|source| RegistrationError::Trigger {
                    job: job.name().to_string(),
                    source,
                })?;
        scheduler.register(job, trigger, settings.enabled)?;
    }

    Ok(())
}

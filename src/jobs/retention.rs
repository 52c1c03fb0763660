//! Retention jobs: the daily log pruning run and the shorter GIF cache eviction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{Job, JobContext, JobError, JobReport};
use crate::config::JobsConfig;
use crate::retention::{RetentionEngine, RetentionPolicy, RetentionTarget};
use crate::trigger::Clock;

pub struct RetentionJob {
    name: &'static str,
    description: &'static str,
    engine: RetentionEngine,
    policies: Vec<RetentionPolicy>,
    clock: Arc<dyn Clock>,
}

impl RetentionJob {
    /// Activity logs, closed poll votes, past event history and cached media.
    pub fn log_retention(engine: RetentionEngine, config: &JobsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: "log_retention",
            description: "Delete activity logs and cached media past the retention window",
            engine,
            policies: RetentionTarget::LOG_TARGETS
                .iter()
                .map(|target| RetentionPolicy::days(*target, config.log_retention_days))
                .collect(),
            clock,
        }
    }

    /// GIF search cache entries not used recently.
    pub fn cache_eviction(engine: RetentionEngine, config: &JobsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: "cache_eviction",
            description: "Evict GIF cache entries that have not been used recently",
            engine,
            policies: vec![RetentionPolicy::days(
                RetentionTarget::GiphyCache,
                config.cache_eviction_days,
            )],
            clock,
        }
    }

    pub fn policies(&self) -> &[RetentionPolicy] {
        &self.policies
    }
}

#[async_trait]
impl Job for RetentionJob {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    #[instrument(skip_all, fields(job = self.name, run_id = %ctx.run_id))]
    async fn run(&self, ctx: &JobContext) -> Result<JobReport, JobError> {
        let report = self.engine.run(&self.policies, self.clock.now()).await;

        let failed_targets = report.failed_targets();
        if failed_targets.len() == self.policies.len() && !self.policies.is_empty() {
            return Err(JobError::Failed {
                message: format!("all {} retention targets failed", failed_targets.len()),
            });
        }
        if !failed_targets.is_empty() {
            warn!(?failed_targets, "Some retention targets failed");
        }

        info!(
            deleted = report.total_deleted(),
            failed_files = report.total_failed(),
            "Retention run finished"
        );

        Ok(JobReport {
            items_processed: self.policies.len() as u64,
            items_affected: report.total_deleted(),
            items_failed: report.total_failed() + failed_targets.len() as u64,
        })
    }
}

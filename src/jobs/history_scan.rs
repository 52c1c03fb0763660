//! # History Scan Job
//!
//! Backfills media findings from channel history that predates logging.
//! Each run picks a few unfinished channels, least recently attempted first,
//! and pages backwards from each channel's cursor. Every page is committed
//! with its findings, so an interrupted channel resumes where it stopped.
//!
//! A channel is finished once the platform returns a short page or the
//! per-channel item cap is reached. Failures stay with the channel: it keeps
//! its committed cursor and the remaining channels still run.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, error, info, instrument, warn};

use super::{Job, JobContext, JobError, JobReport, map_db_err};
use crate::config::JobsConfig;
use crate::media_detector::MediaDetector;
use crate::platform::{PlatformClient, PlatformError, PlatformMessage};
use crate::repositories::checkpoint::{Checkpoint, CheckpointDomain, CheckpointStore, ScanCursor};
use crate::repositories::media_recommendation::{FindingTally, NewRecommendation, record_findings};
use crate::trigger::Clock;

/// Limits for one history scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryScanLimits {
    pub channels_per_run: u64,
    pub page_size: u32,
    pub max_items_per_channel: u64,
}

impl From<&JobsConfig> for HistoryScanLimits {
    fn from(config: &JobsConfig) -> Self {
        Self {
            channels_per_run: config.history_scan_channels_per_run,
            page_size: config.history_scan_page_size,
            max_items_per_channel: config.history_scan_max_items_per_channel,
        }
    }
}

#[derive(Debug, Default)]
struct ChannelProgress {
    pages: u64,
    scanned: u64,
    found: u64,
    rejected: u64,
    completed: bool,
}

pub struct HistoryScanJob {
    db: DatabaseConnection,
    checkpoints: CheckpointStore,
    detector: Arc<MediaDetector>,
    platform: Arc<dyn PlatformClient>,
    clock: Arc<dyn Clock>,
    limits: HistoryScanLimits,
}

impl HistoryScanJob {
    pub fn new(
        db: DatabaseConnection,
        detector: Arc<MediaDetector>,
        platform: Arc<dyn PlatformClient>,
        clock: Arc<dyn Clock>,
        limits: HistoryScanLimits,
    ) -> Self {
        Self {
            checkpoints: CheckpointStore::new(db.clone()),
            db,
            detector,
            platform,
            clock,
            limits,
        }
    }

    fn is_skipped_author(message: &PlatformMessage, bot_user_id: Option<i64>) -> bool {
        message.author_is_bot || Some(message.author_id) == bot_user_id
    }

    async fn scan_channel(
        &self,
        cursor: &ScanCursor,
        bot_user_id: Option<i64>,
    ) -> Result<ChannelProgress, JobError> {
        let domain = cursor.domain();
        let page_size = u64::from(self.limits.page_size.max(1));
        let mut checkpoint = cursor.checkpoint.clone();
        let mut progress = ChannelProgress::default();

        loop {
            let remaining = self
                .limits
                .max_items_per_channel
                .saturating_sub(checkpoint.items_scanned.max(0) as u64);
            let limit = remaining.min(page_size);

            let page = if limit == 0 {
                Vec::new()
            } else {
                self.platform
                    .fetch_messages_before(cursor.channel_id, checkpoint.last_id, limit as u32)
                    .await?
            };

            let findings: Vec<NewRecommendation> = page
                .iter()
                .filter(|m| !Self::is_skipped_author(m, bot_user_id))
                .flat_map(|m| self.findings_for(cursor.guild_id, m))
                .collect();

            let now = self.clock.now();
            let scanned_total = checkpoint.items_scanned + page.len() as i64;
            let reached_end = (page.len() as u64) < limit || limit == 0;
            let reached_cap = scanned_total.max(0) as u64 >= self.limits.max_items_per_channel;

            let mut next = Checkpoint {
                last_id: page.iter().map(|m| m.id).min().or(checkpoint.last_id),
                last_run_at: Some(now),
                items_scanned: scanned_total,
                items_found: checkpoint.items_found,
                completed_at: (reached_end || reached_cap).then_some(now),
            };

            let txn = self
                .db
                .begin()
                .await
                .map_err(|err| map_db_err("failed to start history scan transaction", err))?;

            match self.persist_page(&txn, &findings, &mut next, domain).await {
                Ok(tally) => {
                    txn.commit()
                        .await
                        .map_err(|err| map_db_err("failed to commit history page", err))?;
                    progress.found += tally.inserted;
                    progress.rejected += tally.rejected;
                }
                Err(err) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        warn!(error = %rollback_err, "Failed to roll back history page");
                    }
                    return Err(err);
                }
            }

            progress.pages += 1;
            progress.scanned += page.len() as u64;
            debug!(
                channel_id = cursor.channel_id,
                page = progress.pages,
                fetched = page.len(),
                oldest = ?next.last_id,
                "History page committed"
            );

            checkpoint = next;
            if checkpoint.is_complete() {
                progress.completed = true;
                return Ok(progress);
            }
        }
    }

    async fn persist_page(
        &self,
        txn: &DatabaseTransaction,
        findings: &[NewRecommendation],
        next: &mut Checkpoint,
        domain: CheckpointDomain,
    ) -> Result<FindingTally, JobError> {
        let tally = record_findings(txn, findings)
            .await
            .map_err(|err| map_db_err("failed to insert media recommendations", err))?;
        next.items_found += tally.inserted as i64;
        self.checkpoints.commit(txn, domain, next).await?;
        Ok(tally)
    }

    fn findings_for(&self, guild_id: i64, message: &PlatformMessage) -> Vec<NewRecommendation> {
        self.detector
            .detect(&message.content)
            .into_iter()
            .map(|detection| NewRecommendation {
                message_id: message.id,
                user_id: message.author_id,
                channel_id: message.channel_id,
                guild_id,
                media_type: detection.media_type.as_str().to_string(),
                title: detection.title,
                url: detection.url,
                confidence: detection.confidence,
                message_timestamp: message.timestamp,
            })
            .collect()
    }

    async fn record_failure(&self, cursor: &ScanCursor, err: &JobError, at: DateTime<Utc>) {
        match err {
            JobError::Platform(platform_err) if platform_err.is_skippable() => {
                warn!(channel_id = cursor.channel_id, error = %err, "Skipping channel");
            }
            JobError::Platform(PlatformError::Transient(_)) => {
                warn!(channel_id = cursor.channel_id, error = %err, "Channel scan interrupted");
            }
            _ => error!(channel_id = cursor.channel_id, error = %err, "Channel scan failed"),
        }

        if let Err(mark_err) = self
            .checkpoints
            .mark_attempted(cursor.channel_id, cursor.guild_id, at)
            .await
        {
            error!(channel_id = cursor.channel_id, error = %mark_err, "Failed to record scan attempt");
        }
    }
}

#[async_trait]
impl Job for HistoryScanJob {
    fn name(&self) -> &str {
        "history_scan"
    }

    fn description(&self) -> &str {
        "Backfill media recommendations from older channel history"
    }

    #[instrument(skip_all, fields(job = "history_scan", run_id = %ctx.run_id))]
    async fn run(&self, ctx: &JobContext) -> Result<JobReport, JobError> {
        let bot_user_id = match self.platform.bot_user_id().await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "Bot identity unavailable, filtering on bot flag only");
                None
            }
        };

        let channels = self
            .checkpoints
            .pending_channels(self.limits.channels_per_run)
            .await?;
        if channels.is_empty() {
            debug!("No channels left to backfill");
            return Ok(JobReport::default());
        }

        let mut report = JobReport::default();
        for cursor in &channels {
            match self.scan_channel(cursor, bot_user_id).await {
                Ok(progress) => {
                    report.items_processed += progress.scanned;
                    report.items_affected += progress.found;
                    report.items_failed += progress.rejected;
                    info!(
                        channel_id = cursor.channel_id,
                        pages = progress.pages,
                        scanned = progress.scanned,
                        found = progress.found,
                        rejected = progress.rejected,
                        completed = progress.completed,
                        "Channel backfill step finished"
                    );
                }
                Err(err) => {
                    report.items_failed += 1;
                    self.record_failure(cursor, &err, self.clock.now()).await;
                }
            }
        }

        Ok(report)
    }
}

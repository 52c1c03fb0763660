//! # Media Scan Job
//!
//! Walks newly logged messages in ascending id order, records media
//! mentions and advances the global [`CheckpointDomain::MediaScan`] cursor.
//! Findings and the cursor are committed together, so a failed batch is
//! rescanned in full on the next firing.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{debug, info, instrument, warn};

use super::{Job, JobContext, JobError, JobReport, map_db_err};
use crate::media_cache::MediaCache;
use crate::media_detector::MediaDetector;
use crate::platform::PlatformClient;
use crate::repositories::checkpoint::{Checkpoint, CheckpointDomain, CheckpointStore};
use crate::repositories::media_recommendation::{FindingTally, NewRecommendation, record_findings};
use crate::repositories::message_log::{MessageLogRepository, ScannableMessage};
use crate::repositories::{AttachmentRepository, SettingsRepository};
use crate::trigger::Clock;

pub struct MediaScanJob {
    db: DatabaseConnection,
    checkpoints: CheckpointStore,
    messages: MessageLogRepository,
    attachments: AttachmentRepository,
    settings: SettingsRepository,
    detector: Arc<MediaDetector>,
    platform: Arc<dyn PlatformClient>,
    cache: MediaCache,
    clock: Arc<dyn Clock>,
    batch_size: u64,
}

impl MediaScanJob {
    pub fn new(
        db: DatabaseConnection,
        detector: Arc<MediaDetector>,
        platform: Arc<dyn PlatformClient>,
        cache: MediaCache,
        clock: Arc<dyn Clock>,
        batch_size: u64,
    ) -> Self {
        Self {
            checkpoints: CheckpointStore::new(db.clone()),
            messages: MessageLogRepository::new(db.clone()),
            attachments: AttachmentRepository::new(db.clone()),
            settings: SettingsRepository::new(db.clone()),
            db,
            detector,
            platform,
            cache,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    fn findings_for(&self, message: &ScannableMessage) -> Vec<NewRecommendation> {
        self.detector
            .detect(&message.content)
            .into_iter()
            .map(|detection| NewRecommendation {
                message_id: message.message_id,
                user_id: message.user_id,
                channel_id: message.channel_id,
                guild_id: message.guild_id,
                media_type: detection.media_type.as_str().to_string(),
                title: detection.title,
                url: detection.url,
                confidence: detection.confidence,
                message_timestamp: message.timestamp,
            })
            .collect()
    }

    /// Insert findings and advance the cursor inside `txn`.
    async fn persist_batch(
        &self,
        txn: &DatabaseTransaction,
        findings: &[NewRecommendation],
        current: &Checkpoint,
        scanned: usize,
        highest_id: i64,
    ) -> Result<FindingTally, JobError> {
        let tally = record_findings(txn, findings)
            .await
            .map_err(|err| map_db_err("failed to insert media recommendations", err))?;

        let next = Checkpoint {
            last_id: Some(highest_id),
            last_run_at: Some(self.clock.now()),
            items_scanned: current.items_scanned + scanned as i64,
            items_found: current.items_found + tally.inserted as i64,
            completed_at: None,
        };
        self.checkpoints
            .commit(txn, CheckpointDomain::MediaScan, &next)
            .await?;

        Ok(tally)
    }

    /// Download attachments of the scanned messages that have no local copy.
    ///
    /// Returns `(cached, failed)`. Runs after the batch commit, so failures
    /// here never hold back the cursor.
    async fn cache_attachments(&self, message_ids: &[i64]) -> (u64, u64) {
        let pending = match self.attachments.uncached_for_messages(message_ids).await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "Failed to load attachments for caching");
                return (0, 1);
            }
        };

        let mut cached = 0;
        let mut failed = 0;
        for attachment in pending {
            let result = async {
                let bytes = self.platform.download(&attachment.url).await?;
                let path = self
                    .cache
                    .store(&attachment.filename, attachment.content_type.as_deref(), &bytes)
                    .await?;
                self.attachments
                    .mark_cached(attachment.id, &path, self.clock.now())
                    .await?;
                Ok::<_, JobError>(path)
            }
            .await;

            match result {
                Ok(path) => {
                    debug!(attachment_id = attachment.attachment_id, %path, "Attachment cached");
                    cached += 1;
                }
                Err(err) => {
                    warn!(attachment_id = attachment.attachment_id, error = %err, "Failed to cache attachment");
                    failed += 1;
                }
            }
        }

        (cached, failed)
    }
}

#[async_trait]
impl Job for MediaScanJob {
    fn name(&self) -> &str {
        "media_scan"
    }

    fn description(&self) -> &str {
        "Scan newly logged messages for anime, show, game and video recommendations"
    }

    #[instrument(skip_all, fields(job = "media_scan", run_id = %ctx.run_id))]
    async fn run(&self, ctx: &JobContext) -> Result<JobReport, JobError> {
        let current = self.checkpoints.get(CheckpointDomain::MediaScan).await?;
        let cursor = current.last_id.unwrap_or(0);

        let batch = self
            .messages
            .find_after(cursor, self.batch_size)
            .await
            .map_err(|err| map_db_err("failed to load messages to scan", err))?;

        let Some(highest_id) = batch.iter().map(|m| m.message_id).max() else {
            debug!(cursor, "No new messages to scan");
            return Ok(JobReport::default());
        };

        let findings: Vec<NewRecommendation> =
            batch.iter().flat_map(|m| self.findings_for(m)).collect();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|err| map_db_err("failed to start media scan transaction", err))?;

        let tally = match self
            .persist_batch(&txn, &findings, &current, batch.len(), highest_id)
            .await
        {
            Ok(tally) => tally,
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back media scan batch");
                }
                return Err(err);
            }
        };

        txn.commit()
            .await
            .map_err(|err| map_db_err("failed to commit media scan batch", err))?;

        info!(
            scanned = batch.len(),
            new_findings = tally.inserted,
            rejected = tally.rejected,
            from = cursor,
            to = highest_id,
            "Media scan batch committed"
        );

        let mut report = JobReport {
            items_processed: batch.len() as u64,
            items_affected: tally.inserted,
            items_failed: tally.rejected,
        };

        match self.settings.cache_media_enabled().await {
            Ok(true) => {
                let ids: Vec<i64> = batch.iter().map(|m| m.message_id).collect();
                let (cached, failed) = self.cache_attachments(&ids).await;
                if cached > 0 || failed > 0 {
                    info!(cached, failed, "Attachment caching finished");
                }
                report.items_failed += failed;
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Could not read cache_media setting"),
        }

        Ok(report)
    }
}

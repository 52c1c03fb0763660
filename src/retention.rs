//! # Retention Policy Engine
//!
//! Deletes expired activity rows and evicts stale cache entries. Each
//! [`RetentionTarget`] is pruned on one timestamp column against
//! `now - max_age`, strictly older than the cutoff. Targets are independent:
//! a failure on one is recorded in the report and the rest still run.
//!
//! Parent poll and event rows are never removed here; only their dependants
//! are, and those are deleted explicitly rather than through cascades.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::sea_query::Query;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::db::to_db_time;
use crate::media_cache::MediaCache;
use crate::models::{
    EventInterest, EventLog, EventUpdateLog, GiphyCache, MemberStatusLog, NicknameLog, PollLog,
    PollVote, VoiceLog, event_interest, event_log, event_update_log, giphy_cache,
    member_status_log, nickname_log, poll_log, poll_vote, voice_log,
};
use crate::repositories::AttachmentRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTarget {
    MemberStatusLogs,
    NicknameLogs,
    VoiceLogs,
    /// Votes of polls closed before the cutoff
    PollVotes,
    /// Interest rows of events that ended before the cutoff
    EventInterests,
    /// Change history of events that ended before the cutoff
    EventUpdateLogs,
    /// Downloaded attachment files and their `local_path`
    CachedMedia,
    GiphyCache,
}

impl RetentionTarget {
    /// Every target pruned by the daily log retention run.
    pub const LOG_TARGETS: [RetentionTarget; 7] = [
        RetentionTarget::MemberStatusLogs,
        RetentionTarget::NicknameLogs,
        RetentionTarget::VoiceLogs,
        RetentionTarget::PollVotes,
        RetentionTarget::EventInterests,
        RetentionTarget::EventUpdateLogs,
        RetentionTarget::CachedMedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionTarget::MemberStatusLogs => "member_status_logs",
            RetentionTarget::NicknameLogs => "nickname_logs",
            RetentionTarget::VoiceLogs => "voice_logs",
            RetentionTarget::PollVotes => "poll_votes",
            RetentionTarget::EventInterests => "event_interests",
            RetentionTarget::EventUpdateLogs => "event_update_logs",
            RetentionTarget::CachedMedia => "cached_media",
            RetentionTarget::GiphyCache => "giphy_cache",
        }
    }
}

impl fmt::Display for RetentionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub target: RetentionTarget,
    pub max_age: Duration,
}

impl RetentionPolicy {
    pub fn days(target: RetentionTarget, days: u32) -> Self {
        Self {
            target,
            max_age: Duration::days(i64::from(days)),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age
    }
}

/// Result of pruning one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TargetOutcome {
    pub target: RetentionTarget,
    /// Rows deleted, or for cached media, files evicted
    pub deleted: u64,
    /// Individual files that could not be removed
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetentionReport {
    pub targets: Vec<TargetOutcome>,
}

impl RetentionReport {
    pub fn total_deleted(&self) -> u64 {
        self.targets.iter().map(|t| t.deleted).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.targets.iter().map(|t| t.failed).sum()
    }

    pub fn failed_targets(&self) -> Vec<RetentionTarget> {
        self.targets
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.target)
            .collect()
    }

    pub fn outcome(&self, target: RetentionTarget) -> Option<&TargetOutcome> {
        self.targets.iter().find(|t| t.target == target)
    }
}

#[derive(Debug, thiserror::Error)]
enum PruneError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct RetentionEngine {
    db: DatabaseConnection,
    attachments: AttachmentRepository,
    cache: MediaCache,
}

impl RetentionEngine {
    pub fn new(db: DatabaseConnection, cache: MediaCache) -> Self {
        Self {
            attachments: AttachmentRepository::new(db.clone()),
            db,
            cache,
        }
    }

    /// Prune every policy in order. Never fails as a whole.
    pub async fn run(&self, policies: &[RetentionPolicy], now: DateTime<Utc>) -> RetentionReport {
        let mut report = RetentionReport::default();

        for policy in policies {
            let cutoff = policy.cutoff(now);
            let outcome = match self.prune(policy.target, cutoff).await {
                Ok((deleted, failed)) => {
                    counter!("retention_rows_deleted_total", "target" => policy.target.as_str())
                        .increment(deleted);
                    info!(
                        target_name = %policy.target,
                        deleted,
                        failed,
                        cutoff = %cutoff,
                        "Retention target pruned"
                    );
                    TargetOutcome {
                        target: policy.target,
                        deleted,
                        failed,
                        error: None,
                    }
                }
                Err(err) => {
                    error!(target_name = %policy.target, error = %err, "Retention target failed");
                    TargetOutcome {
                        target: policy.target,
                        deleted: 0,
                        failed: 0,
                        error: Some(err.to_string()),
                    }
                }
            };
            report.targets.push(outcome);
        }

        report
    }

    async fn prune(
        &self,
        target: RetentionTarget,
        cutoff: DateTime<Utc>,
    ) -> Result<(u64, u64), PruneError> {
        let at = to_db_time(cutoff);

        let deleted = match target {
            RetentionTarget::MemberStatusLogs => {
                MemberStatusLog::delete_many()
                    .filter(member_status_log::Column::Timestamp.lt(at))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::NicknameLogs => {
                NicknameLog::delete_many()
                    .filter(nickname_log::Column::Timestamp.lt(at))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::VoiceLogs => {
                VoiceLog::delete_many()
                    .filter(voice_log::Column::Timestamp.lt(at))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::PollVotes => {
                let closed_polls = Query::select()
                    .column(poll_log::Column::PollId)
                    .from(PollLog)
                    .and_where(poll_log::Column::ClosedAt.is_not_null())
                    .and_where(poll_log::Column::ClosedAt.lt(at))
                    .to_owned();
                PollVote::delete_many()
                    .filter(poll_vote::Column::PollId.in_subquery(closed_polls))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::EventInterests => {
                EventInterest::delete_many()
                    .filter(event_interest::Column::EventId.in_subquery(ended_events(at)))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::EventUpdateLogs => {
                EventUpdateLog::delete_many()
                    .filter(event_update_log::Column::UpdatedAt.lt(at))
                    .filter(event_update_log::Column::EventId.in_subquery(ended_events(at)))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
            RetentionTarget::CachedMedia => return self.evict_media(cutoff).await,
            RetentionTarget::GiphyCache => {
                GiphyCache::delete_many()
                    .filter(giphy_cache::Column::LastUsed.lt(at))
                    .exec(&self.db)
                    .await?
                    .rows_affected
            }
        };

        Ok((deleted, 0))
    }

    /// Remove expired attachment files, then sweep unreferenced files by mtime.
    async fn evict_media(&self, cutoff: DateTime<Utc>) -> Result<(u64, u64), PruneError> {
        let mut evicted = 0;
        let mut failed = 0;

        for attachment in self.attachments.cached_before(cutoff).await? {
            let Some(path) = attachment.local_path.as_deref() else {
                continue;
            };
            match self.cache.remove(path).await {
                Ok(()) => {
                    self.attachments.clear_local_path(attachment.id).await?;
                    evicted += 1;
                }
                Err(err) => {
                    // Row keeps its path so the next run retries.
                    warn!(attachment_id = attachment.id, path, error = %err, "Failed to evict cached file");
                    failed += 1;
                }
            }
        }

        let referenced = self.attachments.referenced_paths().await?;
        let sweep = self.cache.sweep_older_than(cutoff, &referenced).await?;

        Ok((evicted + sweep.removed, failed + sweep.failed))
    }
}

fn ended_events(at: chrono::DateTime<chrono::FixedOffset>) -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .column(event_log::Column::EventId)
        .from(EventLog)
        .and_where(event_log::Column::EndTime.is_not_null())
        .and_where(event_log::Column::EndTime.lt(at))
        .to_owned()
}

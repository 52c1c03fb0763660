//! # Checkpoint Store
//!
//! Persisted scan cursors addressed by [`CheckpointDomain`]. The media scan
//! walks message ids upwards from a single global row; the history backfill
//! walks each channel downwards with one row per channel.
//!
//! `commit` accepts any [`ConnectionTrait`] so callers can finalise their
//! work and the cursor in the same transaction.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::to_db_time;
use crate::models::channel_log::{self, ACTION_CREATE, ACTION_DELETE};
use crate::models::channel_scan_history;
use crate::models::media_scan_checkpoint::{self, SINGLETON_ID};
use crate::models::{ChannelLog, ChannelScanHistory, MediaScanCheckpoint};

/// Which cursor a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointDomain {
    /// Global media scan; the cursor only moves up.
    MediaScan,
    /// History backfill of one channel; the cursor only moves down.
    Channel { channel_id: i64, guild_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    Ascending,
    Descending,
}

impl CheckpointDomain {
    pub fn direction(&self) -> CursorDirection {
        match self {
            CheckpointDomain::MediaScan => CursorDirection::Ascending,
            CheckpointDomain::Channel { .. } => CursorDirection::Descending,
        }
    }

    fn label(&self) -> String {
        match self {
            CheckpointDomain::MediaScan => "media_scan".to_string(),
            CheckpointDomain::Channel { channel_id, .. } => format!("channel:{channel_id}"),
        }
    }
}

/// Progress of one scan domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Last processed message id. `None` before the first commit.
    pub last_id: Option<i64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub items_scanned: i64,
    pub items_found: i64,
    /// Terminal marker; only meaningful for channel domains.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns true if moving to `proposed` would go against `direction`.
    fn regresses(&self, proposed: Option<i64>, direction: CursorDirection) -> bool {
        match (self.last_id, proposed) {
            (Some(current), Some(next)) => match direction {
                CursorDirection::Ascending => next < current,
                CursorDirection::Descending => next > current,
            },
            // Dropping an established cursor would restart the scan.
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// A channel cursor with its identity, as returned by [`CheckpointStore::pending_channels`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    pub channel_id: i64,
    pub guild_id: i64,
    pub checkpoint: Checkpoint,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

impl ScanCursor {
    pub fn domain(&self) -> CheckpointDomain {
        CheckpointDomain::Channel {
            channel_id: self.channel_id,
            guild_id: self.guild_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint for {domain} would regress from {current:?} to {proposed:?}")]
    Regression {
        domain: String,
        current: Option<i64>,
        proposed: Option<i64>,
    },
    #[error("checkpoint storage failed: {0}")]
    Database(#[from] DbErr),
}

/// Repository for scan cursors
#[derive(Clone)]
pub struct CheckpointStore {
    db: DatabaseConnection,
}

impl CheckpointStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load the checkpoint for `domain`, or a zero checkpoint when none exists.
    pub async fn get(&self, domain: CheckpointDomain) -> Result<Checkpoint, CheckpointError> {
        load(&self.db, domain).await
    }

    /// Persist `checkpoint` for `domain`, overwriting any previous value.
    ///
    /// Fails with [`CheckpointError::Regression`] and writes nothing when the
    /// cursor would move against the domain's direction.
    pub async fn commit<C: ConnectionTrait>(
        &self,
        conn: &C,
        domain: CheckpointDomain,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let current = load(conn, domain).await?;
        if current.regresses(checkpoint.last_id, domain.direction()) {
            warn!(
                domain = %domain.label(),
                current = ?current.last_id,
                proposed = ?checkpoint.last_id,
                "Rejected checkpoint regression"
            );
            return Err(CheckpointError::Regression {
                domain: domain.label(),
                current: current.last_id,
                proposed: checkpoint.last_id,
            });
        }

        match domain {
            CheckpointDomain::MediaScan => {
                let row = media_scan_checkpoint::ActiveModel {
                    id: Set(SINGLETON_ID),
                    last_scanned_message_id: Set(checkpoint.last_id.unwrap_or(0)),
                    last_scan_time: Set(checkpoint.last_run_at.map(to_db_time)),
                    messages_scanned: Set(checkpoint.items_scanned),
                    recommendations_found: Set(checkpoint.items_found),
                };
                MediaScanCheckpoint::insert(row)
                    .on_conflict(
                        OnConflict::column(media_scan_checkpoint::Column::Id)
                            .update_columns([
                                media_scan_checkpoint::Column::LastScannedMessageId,
                                media_scan_checkpoint::Column::LastScanTime,
                                media_scan_checkpoint::Column::MessagesScanned,
                                media_scan_checkpoint::Column::RecommendationsFound,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(conn)
                    .await?;
            }
            CheckpointDomain::Channel {
                channel_id,
                guild_id,
            } => {
                let row = channel_scan_history::ActiveModel {
                    channel_id: Set(channel_id),
                    guild_id: Set(guild_id),
                    oldest_message_id: Set(checkpoint.last_id),
                    messages_scanned: Set(checkpoint.items_scanned),
                    recommendations_found: Set(checkpoint.items_found),
                    scan_completed_at: Set(checkpoint.completed_at.map(to_db_time)),
                    last_attempted_at: Set(checkpoint.last_run_at.map(to_db_time)),
                };
                ChannelScanHistory::insert(row)
                    .on_conflict(
                        OnConflict::column(channel_scan_history::Column::ChannelId)
                            .update_columns([
                                channel_scan_history::Column::GuildId,
                                channel_scan_history::Column::OldestMessageId,
                                channel_scan_history::Column::MessagesScanned,
                                channel_scan_history::Column::RecommendationsFound,
                                channel_scan_history::Column::ScanCompletedAt,
                                channel_scan_history::Column::LastAttemptedAt,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(conn)
                    .await?;
            }
        }

        debug!(domain = %domain.label(), last_id = ?checkpoint.last_id, "Checkpoint committed");
        Ok(())
    }

    /// Channels whose backfill is not complete, least recently attempted first.
    ///
    /// Candidates are channels with a `create` audit row (which carries the
    /// guild) that have not since been deleted, plus channels that already
    /// have an unfinished cursor.
    pub async fn pending_channels(&self, limit: u64) -> Result<Vec<ScanCursor>, CheckpointError> {
        let created: Vec<(i64, i64)> = ChannelLog::find()
            .select_only()
            .column(channel_log::Column::ChannelId)
            .column(channel_log::Column::GuildId)
            .filter(channel_log::Column::Action.eq(ACTION_CREATE))
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;

        let deleted: HashSet<i64> = ChannelLog::find()
            .select_only()
            .column(channel_log::Column::ChannelId)
            .filter(channel_log::Column::Action.eq(ACTION_DELETE))
            .distinct()
            .into_tuple::<i64>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();

        let mut cursors: BTreeMap<i64, ScanCursor> = ChannelScanHistory::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.channel_id, cursor_from_row(row)))
            .collect();

        for (channel_id, guild_id) in created {
            cursors.entry(channel_id).or_insert_with(|| ScanCursor {
                channel_id,
                guild_id,
                checkpoint: Checkpoint::default(),
                last_attempted_at: None,
            });
        }

        let mut pending: Vec<ScanCursor> = cursors
            .into_values()
            .filter(|cursor| !cursor.checkpoint.is_complete())
            .filter(|cursor| !deleted.contains(&cursor.channel_id))
            .collect();

        // `None` sorts before `Some`, so never-attempted channels lead.
        pending.sort_by_key(|cursor| (cursor.last_attempted_at, cursor.channel_id));
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(pending)
    }

    /// Record an attempt on a channel without touching its cursor.
    pub async fn mark_attempted(
        &self,
        channel_id: i64,
        guild_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let row = channel_scan_history::ActiveModel {
            channel_id: Set(channel_id),
            guild_id: Set(guild_id),
            oldest_message_id: Set(None),
            messages_scanned: Set(0),
            recommendations_found: Set(0),
            scan_completed_at: Set(None),
            last_attempted_at: Set(Some(to_db_time(at))),
        };

        ChannelScanHistory::insert(row)
            .on_conflict(
                OnConflict::column(channel_scan_history::Column::ChannelId)
                    .update_column(channel_scan_history::Column::LastAttemptedAt)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    /// Whether the backfill of `channel_id` has reached its terminal state.
    pub async fn is_complete(&self, channel_id: i64) -> Result<bool, CheckpointError> {
        let row = ChannelScanHistory::find_by_id(channel_id)
            .one(&self.db)
            .await?;
        Ok(row.is_some_and(|row| row.scan_completed_at.is_some()))
    }
}

async fn load<C: ConnectionTrait>(
    conn: &C,
    domain: CheckpointDomain,
) -> Result<Checkpoint, CheckpointError> {
    let checkpoint = match domain {
        CheckpointDomain::MediaScan => MediaScanCheckpoint::find_by_id(SINGLETON_ID)
            .one(conn)
            .await?
            .map(|row| Checkpoint {
                last_id: Some(row.last_scanned_message_id),
                last_run_at: row.last_scan_time.map(|t| t.with_timezone(&Utc)),
                items_scanned: row.messages_scanned,
                items_found: row.recommendations_found,
                completed_at: None,
            }),
        CheckpointDomain::Channel { channel_id, .. } => ChannelScanHistory::find_by_id(channel_id)
            .one(conn)
            .await?
            .map(|row| cursor_from_row(row).checkpoint),
    };

    Ok(checkpoint.unwrap_or_default())
}

fn cursor_from_row(row: channel_scan_history::Model) -> ScanCursor {
    let last_attempted_at = row.last_attempted_at.map(|t| t.with_timezone(&Utc));
    ScanCursor {
        channel_id: row.channel_id,
        guild_id: row.guild_id,
        checkpoint: Checkpoint {
            last_id: row.oldest_message_id,
            last_run_at: last_attempted_at,
            items_scanned: row.messages_scanned,
            items_found: row.recommendations_found,
            completed_at: row.scan_completed_at.map(|t| t.with_timezone(&Utc)),
        },
        last_attempted_at,
    }
}

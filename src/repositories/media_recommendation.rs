//! # Media Recommendation Repository
//!
//! Findings are keyed by `(message_id, media_type, title)`. Rescans produce the
//! same keys again, so inserts silently skip rows that already exist.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{debug, warn};

use crate::db::to_db_time;
use crate::error::{is_rejected_row, is_unique_violation};
use crate::models::MediaRecommendation;
use crate::models::media_recommendation::{ActiveModel, Column, Model};

/// A detected media mention ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecommendation {
    pub message_id: i64,
    pub user_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub media_type: String,
    pub title: String,
    pub url: Option<String>,
    pub confidence: f32,
    pub message_timestamp: DateTime<Utc>,
}

/// Insert a finding, returning `false` when an identical one already exists.
pub async fn insert_if_absent<C: ConnectionTrait>(
    conn: &C,
    finding: &NewRecommendation,
) -> Result<bool, DbErr> {
    let row = ActiveModel {
        message_id: Set(finding.message_id),
        user_id: Set(finding.user_id),
        channel_id: Set(finding.channel_id),
        guild_id: Set(finding.guild_id),
        media_type: Set(finding.media_type.clone()),
        title: Set(finding.title.clone()),
        url: Set(finding.url.clone()),
        confidence_score: Set(finding.confidence),
        message_timestamp: Set(to_db_time(finding.message_timestamp)),
        ..Default::default()
    };

    let result = MediaRecommendation::insert(row)
        .on_conflict(
            OnConflict::columns([Column::MessageId, Column::MediaType, Column::Title])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await;

    match result {
        Ok(rows) => Ok(rows > 0),
        Err(DbErr::RecordNotInserted) => Ok(false),
        Err(err) if is_unique_violation(&err) => {
            debug!(
                message_id = finding.message_id,
                media_type = %finding.media_type,
                "Duplicate media recommendation skipped"
            );
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Outcome of [`record_findings`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FindingTally {
    pub inserted: u64,
    pub rejected: u64,
}

/// Insert each finding under its own savepoint of `txn`.
///
/// A row the database refuses is logged and skipped, leaving the rest of the
/// batch (and whatever else `txn` carries) intact. Any other error aborts.
pub async fn record_findings(
    txn: &DatabaseTransaction,
    findings: &[NewRecommendation],
) -> Result<FindingTally, DbErr> {
    let mut tally = FindingTally::default();
    for finding in findings {
        let savepoint = txn.begin().await?;
        match insert_if_absent(&savepoint, finding).await {
            Ok(inserted) => {
                savepoint.commit().await?;
                if inserted {
                    tally.inserted += 1;
                }
            }
            Err(err) if is_rejected_row(&err) => {
                warn!(
                    message_id = finding.message_id,
                    media_type = %finding.media_type,
                    title_chars = finding.title.chars().count(),
                    error = %err,
                    "Media recommendation rejected"
                );
                savepoint.rollback().await?;
                tally.rejected += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(tally)
}

/// All findings recorded for one message.
pub async fn find_by_message<C: ConnectionTrait>(
    conn: &C,
    message_id: i64,
) -> Result<Vec<Model>, DbErr> {
    MediaRecommendation::find()
        .filter(Column::MessageId.eq(message_id))
        .all(conn)
        .await
}

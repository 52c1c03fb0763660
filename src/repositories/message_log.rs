//! # Message Log Repository
//!
//! Read access to logged messages for the media scan. Messages carry no guild
//! of their own; it is resolved through the channel's `create` audit row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::models::channel_log::{self, ACTION_CREATE};
use crate::models::message_log::{Column, Model};
use crate::models::{ChannelLog, MessageLog};

/// A logged message with its resolved guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannableMessage {
    pub message_id: i64,
    pub user_id: i64,
    pub channel_id: i64,
    /// `0` when the channel's guild is unknown
    pub guild_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub struct MessageLogRepository {
    db: DatabaseConnection,
}

impl MessageLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Messages with id strictly greater than `after` and non-empty content,
    /// ascending by id, at most `limit` rows.
    pub async fn find_after(
        &self,
        after: i64,
        limit: u64,
    ) -> Result<Vec<ScannableMessage>, DbErr> {
        let rows: Vec<Model> = MessageLog::find()
            .filter(Column::MessageId.gt(after))
            .filter(Column::Content.is_not_null())
            .filter(Column::Content.ne(""))
            .order_by_asc(Column::MessageId)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut channel_ids: Vec<i64> = rows.iter().map(|row| row.channel_id).collect();
        channel_ids.sort_unstable();
        channel_ids.dedup();
        let guilds = guilds_for_channels(&self.db, &channel_ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| ScannableMessage {
                message_id: row.message_id,
                user_id: row.user_id,
                channel_id: row.channel_id,
                guild_id: guilds.get(&row.channel_id).copied().unwrap_or(0),
                content: row.content.unwrap_or_default(),
                timestamp: row.timestamp.with_timezone(&Utc),
            })
            .collect())
    }
}

/// Map each channel to the guild recorded in its `create` audit row.
pub async fn guilds_for_channels<C: ConnectionTrait>(
    conn: &C,
    channel_ids: &[i64],
) -> Result<HashMap<i64, i64>, DbErr> {
    if channel_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let pairs: Vec<(i64, i64)> = ChannelLog::find()
        .select_only()
        .column(channel_log::Column::ChannelId)
        .column(channel_log::Column::GuildId)
        .filter(channel_log::Column::Action.eq(ACTION_CREATE))
        .filter(channel_log::Column::ChannelId.is_in(channel_ids.iter().copied()))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(pairs.into_iter().collect())
}

//! ChannelScanHistory entity model
//!
//! Per-channel backfill cursor. `oldest_message_id` only ever moves toward older
//! history. Once `scan_completed_at` is set the channel is never scanned again.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "channel_scan_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: i64,
    pub guild_id: i64,
    /// Oldest message processed so far; `None` before the first page
    pub oldest_message_id: Option<i64>,
    pub messages_scanned: i64,
    pub recommendations_found: i64,
    /// Terminal marker, set when no older history remains or the cap is hit
    pub scan_completed_at: Option<DateTimeWithTimeZone>,
    /// Updated on every attempt, successful or not
    pub last_attempted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

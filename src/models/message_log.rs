//! MessageLog entity model
//!
//! Live message log written by the event layer. The media scan job reads it
//! in ascending `message_id` order.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "message_logs")]
pub struct Model {
    /// Platform snowflake, monotonic in creation time
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: i64,

    pub user_id: i64,

    pub channel_id: i64,

    /// Message text, `None` for attachment-only or embed-only messages
    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    pub timestamp: DateTimeWithTimeZone,

    pub edited: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

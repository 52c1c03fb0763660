//! ChannelLog entity model
//!
//! Channel create/update/delete audit rows. The `create` row is also the
//! authoritative source of a channel's guild.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Action recorded when a channel is first seen
pub const ACTION_CREATE: &str = "create";

/// Action recorded when a channel is removed
pub const ACTION_DELETE: &str = "delete";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "channel_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel_id: i64,
    pub guild_id: i64,
    /// One of `create`, `update`, `delete`
    pub action: String,
    pub field_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub old_value: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub new_value: Option<String>,
    pub actor_id: Option<i64>,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

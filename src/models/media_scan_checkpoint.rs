//! MediaScanCheckpoint entity model
//!
//! Single-row table holding the global media scan cursor. The row id is fixed.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Primary key of the only row in the table
pub const SINGLETON_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "media_scan_checkpoint")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub last_scanned_message_id: i64,
    pub last_scan_time: Option<DateTimeWithTimeZone>,
    pub messages_scanned: i64,
    pub recommendations_found: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

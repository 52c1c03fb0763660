//! MemberStatusLog entity model
//!
//! Presence snapshots. These are the highest-volume rows in the schema and the
//! main reason the 31-day retention exists.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "member_status_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i64,
    pub guild_id: i64,
    pub status: String,
    pub client_status_desktop: Option<String>,
    pub client_status_mobile: Option<String>,
    pub client_status_web: Option<String>,
    pub activity_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub activity_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub activity_details: Option<String>,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! EventLog entity model
//!
//! Scheduled guild events. An event is past once `end_time` is set and behind
//! the retention cutoff; events without an end time are treated as ongoing.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "event_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: i64,
    pub guild_id: i64,
    pub channel_id: Option<i64>,
    pub creator_id: Option<i64>,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub start_time: DateTimeWithTimeZone,
    pub end_time: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub location: Option<String>,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_interest::Entity")]
    EventInterest,
    #[sea_orm(has_many = "super::event_update_log::Entity")]
    EventUpdateLog,
}

impl Related<super::event_interest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventInterest.def()
    }
}

impl Related<super::event_update_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EventUpdateLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

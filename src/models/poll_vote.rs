//! PollVote entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// One answer selected by one user; unique per `(poll_id, user_id, answer_id)`
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "poll_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub poll_id: String,
    pub user_id: i64,
    pub answer_id: i32,
    pub voted_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll_log::Entity",
        from = "Column::PollId",
        to = "super::poll_log::Column::PollId",
        on_delete = "Cascade"
    )]
    PollLog,
}

impl Related<super::poll_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

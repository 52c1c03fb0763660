//! MediaRecommendation entity model
//!
//! Findings of the media detector. `(message_id, media_type, title)` is unique,
//! so rescanning a message never produces a second row.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "media_recommendations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Message the mention was found in
    pub message_id: i64,

    /// Author of the message
    pub user_id: i64,

    pub channel_id: i64,

    /// Guild of the channel, `0` when unknown
    pub guild_id: i64,

    /// One of `anime`, `tv_show`, `game`, `youtube`
    pub media_type: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    /// Detector confidence in `0.0..=1.0`
    pub confidence_score: f32,

    pub message_timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

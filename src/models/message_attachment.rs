//! MessageAttachment entity model
//!
//! Attachment metadata for logged messages. `local_path` and `cached_at` are
//! set when the file has been copied into the media cache.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "message_attachments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub message_id: i64,

    #[sea_orm(unique)]
    pub attachment_id: i64,

    pub filename: String,

    pub content_type: Option<String>,

    /// Size in bytes as reported by the platform
    pub size: i64,

    #[sea_orm(column_type = "Text")]
    pub url: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub proxy_url: Option<String>,

    /// Path relative to the media cache root
    #[sea_orm(column_type = "Text", nullable)]
    pub local_path: Option<String>,

    pub cached_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

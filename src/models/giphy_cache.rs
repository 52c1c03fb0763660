//! GiphyCache entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Cached Giphy search result; evicted once `last_used` falls behind the cutoff
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "giphy_cache")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub search_term: String,
    pub gif_id: String,
    #[sea_orm(column_type = "Text")]
    pub gif_url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub gif_title: Option<String>,
    pub gif_rating: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub file_size_bytes: Option<i64>,
    pub cached_at: DateTimeWithTimeZone,
    pub last_used: DateTimeWithTimeZone,
    pub use_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! User entity model
//!
//! Directory of platform accounts, refreshed by the user sync job.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Platform snowflake of the account
    #[sea_orm(primary_key, auto_increment = false)]
    pub discord_user_id: i64,

    pub username: String,

    /// Legacy four-digit discriminator, absent for migrated accounts
    pub discriminator: Option<String>,

    /// Unique handle for accounts without a discriminator
    pub global_handle: Option<String>,

    /// Guild nickname observed during the most recent sync
    pub nickname: Option<String>,

    pub last_seen: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! # User Repository
//!
//! Upserts of guild members observed by the user sync job.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};

use crate::db::to_db_time;
use crate::models::User;
use crate::models::user::{ActiveModel, Column, Model};

/// Identity fields written for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub discord_user_id: i64,
    pub username: String,
    pub discriminator: Option<String>,
    pub global_handle: Option<String>,
    pub nickname: Option<String>,
    pub last_seen: DateTime<Utc>,
}

pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh a user row.
    pub async fn upsert(&self, record: &UserRecord) -> Result<(), DbErr> {
        let row = ActiveModel {
            discord_user_id: Set(record.discord_user_id),
            username: Set(record.username.clone()),
            discriminator: Set(record.discriminator.clone()),
            global_handle: Set(record.global_handle.clone()),
            nickname: Set(record.nickname.clone()),
            last_seen: Set(to_db_time(record.last_seen)),
        };

        User::insert(row)
            .on_conflict(
                OnConflict::column(Column::DiscordUserId)
                    .update_columns([
                        Column::Username,
                        Column::Discriminator,
                        Column::GlobalHandle,
                        Column::Nickname,
                        Column::LastSeen,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    pub async fn find(&self, discord_user_id: i64) -> Result<Option<Model>, DbErr> {
        User::find_by_id(discord_user_id).one(&self.db).await
    }
}

//! # Attachment Repository
//!
//! Tracks which message attachments have a local copy in the media cache.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::db::to_db_time;
use crate::models::MessageAttachment;
use crate::models::message_attachment::{ActiveModel, Column, Model};

#[derive(Clone)]
pub struct AttachmentRepository {
    db: DatabaseConnection,
}

impl AttachmentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Attachments with a cached file older than `cutoff`.
    pub async fn cached_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Model>, DbErr> {
        MessageAttachment::find()
            .filter(Column::LocalPath.is_not_null())
            .filter(Column::CachedAt.lt(to_db_time(cutoff)))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
    }

    /// Attachments of `message_ids` that have not been downloaded yet.
    pub async fn uncached_for_messages(&self, message_ids: &[i64]) -> Result<Vec<Model>, DbErr> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        MessageAttachment::find()
            .filter(Column::MessageId.is_in(message_ids.iter().copied()))
            .filter(Column::LocalPath.is_null())
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
    }

    pub async fn mark_cached(
        &self,
        id: i32,
        local_path: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        ActiveModel {
            id: Set(id),
            local_path: Set(Some(local_path.to_string())),
            cached_at: Set(Some(to_db_time(at))),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    /// Forget the local copy; `cached_at` is kept as a record of the eviction window.
    pub async fn clear_local_path(&self, id: i32) -> Result<(), DbErr> {
        ActiveModel {
            id: Set(id),
            local_path: Set(None),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    /// Relative paths currently referenced by any row.
    pub async fn referenced_paths(&self) -> Result<HashSet<String>, DbErr> {
        let paths: Vec<Option<String>> = MessageAttachment::find()
            .select_only()
            .column(Column::LocalPath)
            .filter(Column::LocalPath.is_not_null())
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(paths.into_iter().flatten().collect())
    }
}

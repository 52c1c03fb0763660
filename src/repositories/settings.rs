//! Key/value runtime settings stored in `system_settings`.

use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};

use crate::models::SystemSetting;
use crate::models::system_setting::{ActiveModel, Column};

pub const CACHE_MEDIA: &str = "cache_media";
pub const SNORT_COOLDOWN_SECONDS: &str = "snort_cooldown_seconds";

const DEFAULT_SNORT_COOLDOWN_SECONDS: u64 = 30;

#[derive(Clone)]
pub struct SettingsRepository {
    db: DatabaseConnection,
}

impl SettingsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, DbErr> {
        Ok(SystemSetting::find_by_id(key.to_string())
            .one(&self.db)
            .await?
            .map(|row| row.setting_value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), DbErr> {
        let row = ActiveModel {
            setting_key: Set(key.to_string()),
            setting_value: Set(value.to_string()),
        };
        SystemSetting::insert(row)
            .on_conflict(
                OnConflict::column(Column::SettingKey)
                    .update_column(Column::SettingValue)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    /// Whether attachments of newly scanned messages should be downloaded.
    pub async fn cache_media_enabled(&self) -> Result<bool, DbErr> {
        Ok(self
            .get(CACHE_MEDIA)
            .await?
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")))
    }

    /// Cooldown for the snort command; unparsable values fall back to 30.
    pub async fn snort_cooldown_seconds(&self) -> Result<u64, DbErr> {
        Ok(self
            .get(SNORT_COOLDOWN_SECONDS)
            .await?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(DEFAULT_SNORT_COOLDOWN_SECONDS))
    }
}

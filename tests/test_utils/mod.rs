//! Test utilities for database and platform testing.
//!
//! Provides an in-memory SQLite database with migrations applied, row seeding
//! helpers and a scripted [`PlatformClient`] for driving the jobs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, NotSet, Set};
use sentinel_jobs::db::to_db_time;
use sentinel_jobs::models::{
    channel_log, event_interest, event_log, event_update_log, giphy_cache, member_status_log,
    message_attachment, message_log, nickname_log, poll_log, poll_vote, voice_log,
};
use sentinel_jobs::platform::{GuildMember, PlatformClient, PlatformError, PlatformMessage};

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool is pinned to a single connection so every query sees the same
/// in-memory database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(3600))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Fixed reference instant used across tests; whole seconds only.
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap()
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(days)
}

pub async fn insert_message(
    db: &DatabaseConnection,
    message_id: i64,
    channel_id: i64,
    user_id: i64,
    content: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    message_log::ActiveModel {
        message_id: Set(message_id),
        user_id: Set(user_id),
        channel_id: Set(channel_id),
        content: Set(content.map(str::to_string)),
        timestamp: Set(to_db_time(timestamp)),
        edited: Set(false),
    }
    .insert(db)
    .await?;
    Ok(())
}

pub async fn insert_channel_log(
    db: &DatabaseConnection,
    channel_id: i64,
    guild_id: i64,
    action: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    channel_log::ActiveModel {
        id: NotSet,
        channel_id: Set(channel_id),
        guild_id: Set(guild_id),
        action: Set(action.to_string()),
        field_name: Set(None),
        old_value: Set(None),
        new_value: Set(None),
        actor_id: Set(None),
        timestamp: Set(to_db_time(timestamp)),
    }
    .insert(db)
    .await?;
    Ok(())
}

pub async fn insert_voice_log(db: &DatabaseConnection, at: DateTime<Utc>) -> Result<i32> {
    let row = voice_log::ActiveModel {
        id: NotSet,
        user_id: Set(1),
        channel_id: Set(Some(10)),
        action: Set("join".to_string()),
        timestamp: Set(to_db_time(at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_member_status_log(db: &DatabaseConnection, at: DateTime<Utc>) -> Result<i32> {
    let row = member_status_log::ActiveModel {
        id: NotSet,
        user_id: Set(1),
        guild_id: Set(100),
        status: Set("online".to_string()),
        client_status_desktop: Set(Some("online".to_string())),
        client_status_mobile: Set(None),
        client_status_web: Set(None),
        activity_type: Set(None),
        activity_name: Set(None),
        activity_details: Set(None),
        timestamp: Set(to_db_time(at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_nickname_log(db: &DatabaseConnection, at: DateTime<Utc>) -> Result<i32> {
    let row = nickname_log::ActiveModel {
        id: NotSet,
        user_id: Set(1),
        guild_id: Set(100),
        old_nickname: Set(Some("old".to_string())),
        new_nickname: Set(Some("new".to_string())),
        timestamp: Set(to_db_time(at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_poll(
    db: &DatabaseConnection,
    poll_id: &str,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
) -> Result<()> {
    poll_log::ActiveModel {
        poll_id: Set(poll_id.to_string()),
        message_id: Set(1),
        channel_id: Set(10),
        guild_id: Set(100),
        creator_id: Set(1),
        question: Set("Best season?".to_string()),
        created_at: Set(to_db_time(created_at)),
        expires_at: Set(None),
        is_multiselect: Set(false),
        closed_at: Set(closed_at.map(to_db_time)),
    }
    .insert(db)
    .await?;
    Ok(())
}

pub async fn insert_poll_vote(
    db: &DatabaseConnection,
    poll_id: &str,
    user_id: i64,
    voted_at: DateTime<Utc>,
) -> Result<i32> {
    let row = poll_vote::ActiveModel {
        id: NotSet,
        poll_id: Set(poll_id.to_string()),
        user_id: Set(user_id),
        answer_id: Set(1),
        voted_at: Set(to_db_time(voted_at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_event(
    db: &DatabaseConnection,
    event_id: i64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
) -> Result<()> {
    event_log::ActiveModel {
        event_id: Set(event_id),
        guild_id: Set(100),
        channel_id: Set(None),
        creator_id: Set(Some(1)),
        name: Set(format!("Watch party {event_id}")),
        description: Set(None),
        start_time: Set(to_db_time(start_time)),
        end_time: Set(end_time.map(to_db_time)),
        location: Set(None),
        status: Set("scheduled".to_string()),
    }
    .insert(db)
    .await?;
    Ok(())
}

pub async fn insert_event_interest(
    db: &DatabaseConnection,
    event_id: i64,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<i32> {
    let row = event_interest::ActiveModel {
        id: NotSet,
        event_id: Set(event_id),
        user_id: Set(user_id),
        interest_type: Set("interested".to_string()),
        expressed_at: Set(to_db_time(at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_event_update(
    db: &DatabaseConnection,
    event_id: i64,
    at: DateTime<Utc>,
) -> Result<i32> {
    let row = event_update_log::ActiveModel {
        id: NotSet,
        event_id: Set(event_id),
        field_name: Set("name".to_string()),
        old_value: Set(Some("a".to_string())),
        new_value: Set(Some("b".to_string())),
        updated_by: Set(Some(1)),
        updated_at: Set(to_db_time(at)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_giphy(
    db: &DatabaseConnection,
    gif_id: &str,
    last_used: DateTime<Utc>,
) -> Result<i32> {
    let row = giphy_cache::ActiveModel {
        id: NotSet,
        search_term: Set("cat".to_string()),
        gif_id: Set(gif_id.to_string()),
        gif_url: Set(format!("https://media.giphy.com/{gif_id}.gif")),
        gif_title: Set(None),
        gif_rating: Set(Some("g".to_string())),
        width: Set(Some(200)),
        height: Set(Some(200)),
        file_size_bytes: Set(Some(1024)),
        cached_at: Set(to_db_time(last_used)),
        last_used: Set(to_db_time(last_used)),
        use_count: Set(1),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub async fn insert_attachment(
    db: &DatabaseConnection,
    message_id: i64,
    attachment_id: i64,
    local_path: Option<&str>,
    cached_at: Option<DateTime<Utc>>,
) -> Result<i32> {
    let row = message_attachment::ActiveModel {
        id: NotSet,
        message_id: Set(message_id),
        attachment_id: Set(attachment_id),
        filename: Set(format!("clip{attachment_id}.png")),
        content_type: Set(Some("image/png".to_string())),
        size: Set(4),
        url: Set(format!("https://cdn.example.test/{attachment_id}.png")),
        proxy_url: Set(None),
        local_path: Set(local_path.map(str::to_string)),
        cached_at: Set(cached_at.map(to_db_time)),
    }
    .insert(db)
    .await?;
    Ok(row.id)
}

pub fn platform_message(
    id: i64,
    channel_id: i64,
    author_id: i64,
    content: &str,
    timestamp: DateTime<Utc>,
) -> PlatformMessage {
    PlatformMessage {
        id,
        channel_id,
        author_id,
        author_is_bot: false,
        content: content.to_string(),
        timestamp,
    }
}

/// How a scripted channel fetch should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    Forbidden,
    Transient,
}

impl FetchFailure {
    fn to_error(self, channel_id: i64) -> PlatformError {
        match self {
            FetchFailure::Forbidden => PlatformError::Forbidden {
                resource: format!("channels/{channel_id}/messages"),
            },
            FetchFailure::Transient => PlatformError::Transient("503 Service Unavailable".into()),
        }
    }
}

/// In-memory platform with scripted channel history, guild membership and
/// downloadable attachments.
#[derive(Default)]
pub struct FakePlatform {
    bot_user_id: Option<i64>,
    /// Channel history, kept sorted newest first
    history: Mutex<HashMap<i64, Vec<PlatformMessage>>>,
    /// Failures keyed by channel, applied after `pages_before_failure` successful fetches
    failures: Mutex<HashMap<i64, (usize, FetchFailure)>>,
    fetches: Mutex<Vec<(i64, Option<i64>, u32)>>,
    members: Mutex<HashMap<i64, Vec<GuildMember>>>,
    /// Guilds the bot is in but cannot list members of
    hidden_guilds: Mutex<Vec<i64>>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakePlatform {
    pub fn new(bot_user_id: Option<i64>) -> Self {
        Self {
            bot_user_id,
            ..Self::default()
        }
    }

    pub fn set_history(&self, channel_id: i64, mut messages: Vec<PlatformMessage>) {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        self.history.lock().unwrap().insert(channel_id, messages);
    }

    pub fn fail_channel(&self, channel_id: i64, pages_before_failure: usize, failure: FetchFailure) {
        self.failures
            .lock()
            .unwrap()
            .insert(channel_id, (pages_before_failure, failure));
    }

    pub fn heal_channel(&self, channel_id: i64) {
        self.failures.lock().unwrap().remove(&channel_id);
    }

    pub fn set_members(&self, guild_id: i64, members: Vec<GuildMember>) {
        self.members.lock().unwrap().insert(guild_id, members);
    }

    pub fn add_hidden_guild(&self, guild_id: i64) {
        self.hidden_guilds.lock().unwrap().push(guild_id);
    }

    pub fn set_download(&self, url: &str, bytes: &[u8]) {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Every fetch as `(channel_id, before, limit)`, in call order.
    pub fn fetches(&self) -> Vec<(i64, Option<i64>, u32)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetches_for(&self, channel_id: i64) -> Vec<(Option<i64>, u32)> {
        self.fetches()
            .into_iter()
            .filter(|(channel, _, _)| *channel == channel_id)
            .map(|(_, before, limit)| (before, limit))
            .collect()
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn fetch_messages_before(
        &self,
        channel_id: i64,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let prior_fetches = self.fetches_for(channel_id).len();
        self.fetches
            .lock()
            .unwrap()
            .push((channel_id, before, limit));

        if let Some((pages_before_failure, failure)) =
            self.failures.lock().unwrap().get(&channel_id).copied()
        {
            if prior_fetches >= pages_before_failure {
                return Err(failure.to_error(channel_id));
            }
        }

        let history = self.history.lock().unwrap();
        let Some(messages) = history.get(&channel_id) else {
            return Err(PlatformError::NotFound {
                resource: format!("channels/{channel_id}"),
            });
        };

        Ok(messages
            .iter()
            .filter(|m| before.is_none_or(|before| m.id < before))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn bot_user_id(&self) -> Result<i64, PlatformError> {
        self.bot_user_id.ok_or_else(|| PlatformError::Other("no identity".into()))
    }

    async fn guild_ids(&self) -> Result<Vec<i64>, PlatformError> {
        let mut ids: Vec<i64> = self.members.lock().unwrap().keys().copied().collect();
        ids.extend(self.hidden_guilds.lock().unwrap().iter().copied());
        ids.sort_unstable();
        Ok(ids)
    }

    async fn guild_members(&self, guild_id: i64) -> Result<Vec<GuildMember>, PlatformError> {
        self.members
            .lock()
            .unwrap()
            .get(&guild_id)
            .cloned()
            .ok_or_else(|| PlatformError::Forbidden {
                resource: format!("guilds/{guild_id}/members"),
            })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PlatformError> {
        self.downloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                resource: url.to_string(),
            })
    }
}

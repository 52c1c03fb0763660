//! # Chat Platform Access
//!
//! The jobs talk to the chat platform only through [`PlatformClient`], which
//! keeps scans testable with in-memory fakes. [`discord::DiscordClient`] is
//! the REST implementation used in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod discord;

pub use discord::DiscordClient;

/// A message as returned by the platform's history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMessage {
    pub id: i64,
    pub channel_id: i64,
    pub author_id: i64,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A guild member with the identity fields the user sync stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub user_id: i64,
    pub username: String,
    /// Legacy discriminator; `None` for accounts on unique handles
    pub discriminator: Option<String>,
    pub nickname: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("access to {resource} is forbidden")]
    Forbidden { resource: String },
    #[error("{resource} was not found")]
    NotFound { resource: String },
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("transient platform failure: {0}")]
    Transient(String),
    #[error("platform request failed: {0}")]
    Other(String),
}

impl PlatformError {
    /// Errors confined to one resource; the caller skips it and moves on.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PlatformError::Forbidden { .. }
                | PlatformError::NotFound { .. }
                | PlatformError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            PlatformError::Transient(err.to_string())
        } else {
            PlatformError::Other(err.to_string())
        }
    }
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Up to `limit` messages older than `before` (newest first), or the most
    /// recent messages when `before` is `None`.
    async fn fetch_messages_before(
        &self,
        channel_id: i64,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError>;

    async fn bot_user_id(&self) -> Result<i64, PlatformError>;

    async fn guild_ids(&self) -> Result<Vec<i64>, PlatformError>;

    async fn guild_members(&self, guild_id: i64) -> Result<Vec<GuildMember>, PlatformError>;

    /// Fetch the raw bytes behind an attachment URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, PlatformError>;
}

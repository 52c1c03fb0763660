//! Discord REST client.
//!
//! Only the handful of read endpoints the maintenance jobs need. Snowflakes
//! arrive as JSON strings and are parsed into `i64`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Deserializer};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use super::{GuildMember, PlatformClient, PlatformError, PlatformMessage};

/// Largest page the guild list endpoint serves.
const GUILD_PAGE_SIZE: u32 = 200;
/// Largest page the member list endpoint serves.
const MEMBER_PAGE_SIZE: u32 = 1000;
/// Largest page the message history endpoint serves.
const MESSAGE_PAGE_LIMIT: u32 = 100;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct DiscordClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
    bot_user_id: OnceCell<i64>,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(api_base: &str, token: impl Into<String>) -> Result<Self, PlatformError> {
        let mut api_base = Url::parse(api_base)
            .map_err(|err| PlatformError::Other(format!("invalid api base: {err}")))?;
        // Keep the version segment when joining relative paths.
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "DiscordBot (sentinel-jobs, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;

        Ok(Self {
            http,
            api_base,
            token: token.into(),
            bot_user_id: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        self.api_base
            .join(path.trim_start_matches('/'))
            .map_err(|err| PlatformError::Other(format!("invalid endpoint {path}: {err}")))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        resource: &str,
    ) -> Result<T, PlatformError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;

        let response = check_status(response, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| PlatformError::Other(format!("malformed {resource} response: {err}")))
    }
}

async fn check_status(response: Response, resource: &str) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(PlatformError::Forbidden {
            resource: resource.to_string(),
        }),
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound {
            resource: resource.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .map(|secs| secs.ceil().max(0.0) as u64)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(resource, retry_after_secs, "Rate limited by Discord API");
            Err(PlatformError::RateLimited { retry_after_secs })
        }
        s if s.is_server_error() => {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Transient(format!("{resource}: {s} {body}")))
        }
        s => {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Other(format!("{resource}: {s} {body}")))
        }
    }
}

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(deserialize_with = "snowflake")]
    id: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(deserialize_with = "snowflake")]
    id: i64,
    #[serde(deserialize_with = "snowflake")]
    channel_id: i64,
    author: ApiUser,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiGuild {
    #[serde(deserialize_with = "snowflake")]
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    user: ApiUser,
    #[serde(default)]
    nick: Option<String>,
}

impl From<ApiMember> for GuildMember {
    fn from(member: ApiMember) -> Self {
        // Accounts migrated to unique handles report "0".
        let discriminator = member
            .user
            .discriminator
            .filter(|d| !d.is_empty() && d != "0");
        GuildMember {
            user_id: member.user.id,
            username: member.user.username,
            discriminator,
            nickname: member.nick,
            is_bot: member.user.bot,
        }
    }
}

#[async_trait]
impl PlatformClient for DiscordClient {
    async fn fetch_messages_before(
        &self,
        channel_id: i64,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<PlatformMessage>, PlatformError> {
        let mut url = self.endpoint(&format!("channels/{channel_id}/messages"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.clamp(1, MESSAGE_PAGE_LIMIT).to_string());
            if let Some(before) = before {
                query.append_pair("before", &before.to_string());
            }
        }

        let messages: Vec<ApiMessage> = self
            .get_json(url, &format!("channel {channel_id}"))
            .await?;
        debug!(channel_id, count = messages.len(), "Fetched message page");

        Ok(messages
            .into_iter()
            .map(|m| PlatformMessage {
                id: m.id,
                channel_id: m.channel_id,
                author_id: m.author.id,
                author_is_bot: m.author.bot,
                content: m.content,
                timestamp: m.timestamp,
            })
            .collect())
    }

    async fn bot_user_id(&self) -> Result<i64, PlatformError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let me: ApiUser = self.get_json(self.endpoint("users/@me")?, "current user").await?;
                Ok(me.id)
            })
            .await
            .copied()
    }

    async fn guild_ids(&self) -> Result<Vec<i64>, PlatformError> {
        let mut ids = Vec::new();
        let mut after: Option<i64> = None;

        loop {
            let mut url = self.endpoint("users/@me/guilds")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &GUILD_PAGE_SIZE.to_string());
                if let Some(after) = after {
                    query.append_pair("after", &after.to_string());
                }
            }

            let page: Vec<ApiGuild> = self.get_json(url, "guild list").await?;
            let full_page = page.len() as u32 >= GUILD_PAGE_SIZE;
            after = page.iter().map(|g| g.id).max();
            ids.extend(page.into_iter().map(|g| g.id));

            if !full_page || after.is_none() {
                break;
            }
        }

        Ok(ids)
    }

    async fn guild_members(&self, guild_id: i64) -> Result<Vec<GuildMember>, PlatformError> {
        let mut members = Vec::new();
        let mut after: i64 = 0;

        loop {
            let mut url = self.endpoint(&format!("guilds/{guild_id}/members"))?;
            url.query_pairs_mut()
                .append_pair("limit", &MEMBER_PAGE_SIZE.to_string())
                .append_pair("after", &after.to_string());

            let page: Vec<ApiMember> = self
                .get_json(url, &format!("guild {guild_id} members"))
                .await?;
            let full_page = page.len() as u32 >= MEMBER_PAGE_SIZE;
            let Some(last) = page.iter().map(|m| m.user.id).max() else {
                break;
            };
            after = last;
            members.extend(page.into_iter().map(GuildMember::from));

            if !full_page {
                break;
            }
        }

        Ok(members)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PlatformError> {
        let response = self.http.get(url).send().await?;
        let response = check_status(response, "attachment").await?;
        Ok(response.bytes().await?.to_vec())
    }
}

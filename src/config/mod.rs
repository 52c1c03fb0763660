//! Configuration loading for the Sentinel maintenance engine.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SENTINEL_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trigger::Trigger;

/// Names of the built-in jobs, in registration order.
pub const JOB_NAMES: [&str; 5] = [
    "user_sync",
    "media_scan",
    "history_scan",
    "log_retention",
    "cache_eviction",
];

/// Application configuration derived from `SENTINEL_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,
    #[serde(default = "default_discord_api_base")]
    pub discord_api_base: String,
    #[serde(default = "default_media_cache_dir")]
    pub media_cache_dir: PathBuf,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Per-job trigger and enablement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct JobSettings {
    /// Trigger expression, see [`Trigger`] for the accepted forms
    pub trigger: String,
    pub enabled: bool,
}

impl JobSettings {
    fn new(trigger: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            enabled: true,
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct JobsConfig {
    /// Trigger and enabled flag for each job, keyed by job name
    #[serde(default = "default_job_settings")]
    pub schedules: BTreeMap<String, JobSettings>,

    /// Age in days after which log rows and cached media expire (default: 31)
    ///
    /// Environment variable: `SENTINEL_LOG_RETENTION_DAYS`
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// Age in days after which unused Giphy cache rows are evicted (default: 7)
    ///
    /// Environment variable: `SENTINEL_CACHE_EVICTION_DAYS`
    #[serde(default = "default_cache_eviction_days")]
    pub cache_eviction_days: u32,

    /// Maximum number of live messages examined per media scan run (default: 500)
    #[serde(default = "default_media_scan_batch_size")]
    pub media_scan_batch_size: u64,

    /// Channels backfilled per history scan run (default: 5)
    #[serde(default = "default_history_scan_channels_per_run")]
    pub history_scan_channels_per_run: u64,

    /// Messages requested per history page (default: 100, platform maximum)
    #[serde(default = "default_history_scan_page_size")]
    pub history_scan_page_size: u32,

    /// Upper bound on messages backfilled per channel (default: 10,000)
    #[serde(default = "default_history_scan_max_items_per_channel")]
    pub history_scan_max_items_per_channel: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            schedules: default_job_settings(),
            log_retention_days: default_log_retention_days(),
            cache_eviction_days: default_cache_eviction_days(),
            media_scan_batch_size: default_media_scan_batch_size(),
            history_scan_channels_per_run: default_history_scan_channels_per_run(),
            history_scan_page_size: default_history_scan_page_size(),
            history_scan_max_items_per_channel: default_history_scan_max_items_per_channel(),
        }
    }
}

impl JobsConfig {
    /// Settings for the named job, falling back to the built-in default.
    pub fn settings(&self, job: &str) -> JobSettings {
        self.schedules
            .get(job)
            .cloned()
            .or_else(|| default_job_settings().remove(job))
            .unwrap_or_else(|| JobSettings {
                trigger: "every 1h".to_string(),
                enabled: false,
            })
    }

    /// Validate job configuration bounds and trigger expressions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (job, settings) in &self.schedules {
            if !JOB_NAMES.contains(&job.as_str()) {
                return Err(ConfigError::UnknownJob { job: job.clone() });
            }
            settings
                .trigger
                .parse::<Trigger>()
                .map_err(|source| ConfigError::InvalidTrigger {
                    job: job.clone(),
                    source,
                })?;
        }

        if self.log_retention_days == 0 {
            return Err(ConfigError::InvalidRetentionDays {
                field: "log_retention_days",
                value: self.log_retention_days,
            });
        }

        if self.cache_eviction_days == 0 {
            return Err(ConfigError::InvalidRetentionDays {
                field: "cache_eviction_days",
                value: self.cache_eviction_days,
            });
        }

        if self.media_scan_batch_size == 0 || self.media_scan_batch_size > 10_000 {
            return Err(ConfigError::InvalidMediaScanBatchSize {
                value: self.media_scan_batch_size,
            });
        }

        if self.history_scan_channels_per_run == 0 {
            return Err(ConfigError::InvalidHistoryScanChannels {
                value: self.history_scan_channels_per_run,
            });
        }

        if self.history_scan_page_size == 0 || self.history_scan_page_size > 100 {
            return Err(ConfigError::InvalidHistoryScanPageSize {
                value: self.history_scan_page_size,
            });
        }

        if self.history_scan_max_items_per_channel == 0 {
            return Err(ConfigError::InvalidHistoryScanCap {
                value: self.history_scan_max_items_per_channel,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            discord_token: None,
            discord_api_base: default_discord_api_base(),
            media_cache_dir: default_media_cache_dir(),
            jobs: JobsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.discord_token.is_some() {
            config.discord_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.profile.as_str(), "local" | "test") {
            if self.operator_tokens.is_empty() {
                return Err(ConfigError::MissingOperatorTokens);
            }
            if self.discord_token.is_none() {
                return Err(ConfigError::MissingDiscordToken);
            }
        }

        if let Err(source) = url::Url::parse(&self.discord_api_base) {
            return Err(ConfigError::InvalidDiscordApiBase {
                value: self.discord_api_base.clone(),
                source,
            });
        }

        self.jobs.validate()
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://sentinel.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_media_cache_dir() -> PathBuf {
    PathBuf::from("media_cache")
}

fn default_job_settings() -> BTreeMap<String, JobSettings> {
    BTreeMap::from([
        ("user_sync".to_string(), JobSettings::new("every 12h")),
        ("media_scan".to_string(), JobSettings::new("every 30m")),
        ("history_scan".to_string(), JobSettings::new("every 1h")),
        ("log_retention".to_string(), JobSettings::new("daily 03:00")),
        ("cache_eviction".to_string(), JobSettings::new("daily 04:00")),
    ])
}

fn default_log_retention_days() -> u32 {
    31
}

fn default_cache_eviction_days() -> u32 {
    7
}

fn default_media_scan_batch_size() -> u64 {
    500
}

fn default_history_scan_channels_per_run() -> u64 {
    5
}

fn default_history_scan_page_size() -> u32 {
    100
}

fn default_history_scan_max_items_per_channel() -> u64 {
    10_000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error(
        "no operator tokens configured; set SENTINEL_OPERATOR_TOKEN or SENTINEL_OPERATOR_TOKENS"
    )]
    MissingOperatorTokens,
    #[error("discord bot token is missing; set SENTINEL_DISCORD_TOKEN")]
    MissingDiscordToken,
    #[error("invalid discord api base '{value}': {source}")]
    InvalidDiscordApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("unknown job '{job}' in configuration")]
    UnknownJob { job: String },
    #[error("invalid trigger for job {job}: {source}")]
    InvalidTrigger {
        job: String,
        source: crate::trigger::TriggerParseError,
    },
    #[error("{field} must be at least 1 day, got {value}")]
    InvalidRetentionDays { field: &'static str, value: u32 },
    #[error("media scan batch size must be between 1 and 10000, got {value}")]
    InvalidMediaScanBatchSize { value: u64 },
    #[error("history scan channels per run must be at least 1, got {value}")]
    InvalidHistoryScanChannels { value: u64 },
    #[error("history scan page size must be between 1 and 100, got {value}")]
    InvalidHistoryScanPageSize { value: u32 },
    #[error("history scan per-channel cap must be at least 1, got {value}")]
    InvalidHistoryScanCap { value: u64 },
}

/// Loads configuration using layered `.env` files and `SENTINEL_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from the layered env files, then the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SENTINEL_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        Self::from_layered(layered, profile_hint)
    }

    fn from_layered(
        mut layered: BTreeMap<String, String>,
        profile_hint: String,
    ) -> Result<AppConfig, ConfigError> {
        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = parse_or(&mut layered, "DB_MAX_CONNECTIONS", default_db_max_connections)?;
        let db_acquire_timeout_ms =
            parse_or(&mut layered, "DB_ACQUIRE_TIMEOUT_MS", default_db_acquire_timeout_ms)?;

        // Support both a single token and a comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = layered.remove("OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let discord_token = layered
            .remove("DISCORD_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let discord_api_base = layered
            .remove("DISCORD_API_BASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_discord_api_base);
        let media_cache_dir = layered
            .remove("MEDIA_CACHE_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_media_cache_dir);

        let mut schedules = default_job_settings();
        for job in JOB_NAMES {
            let upper = job.to_ascii_uppercase();
            let entry = schedules
                .entry(job.to_string())
                .or_insert_with(|| JobSettings::new("every 1h"));
            if let Some(trigger) = layered
                .remove(&format!("JOB_{upper}_TRIGGER"))
                .filter(|v| !v.trim().is_empty())
            {
                entry.trigger = trigger.trim().to_string();
            }
            if let Some(enabled) = layered.remove(&format!("JOB_{upper}_ENABLED")) {
                entry.enabled = parse_bool(&format!("JOB_{upper}_ENABLED"), &enabled)?;
            }
        }

        let jobs = JobsConfig {
            schedules,
            log_retention_days: parse_or(&mut layered, "LOG_RETENTION_DAYS", default_log_retention_days)?,
            cache_eviction_days: parse_or(
                &mut layered,
                "CACHE_EVICTION_DAYS",
                default_cache_eviction_days,
            )?,
            media_scan_batch_size: parse_or(
                &mut layered,
                "MEDIA_SCAN_BATCH_SIZE",
                default_media_scan_batch_size,
            )?,
            history_scan_channels_per_run: parse_or(
                &mut layered,
                "HISTORY_SCAN_CHANNELS_PER_RUN",
                default_history_scan_channels_per_run,
            )?,
            history_scan_page_size: parse_or(
                &mut layered,
                "HISTORY_SCAN_PAGE_SIZE",
                default_history_scan_page_size,
            )?,
            history_scan_max_items_per_channel: parse_or(
                &mut layered,
                "HISTORY_SCAN_MAX_ITEMS_PER_CHANNEL",
                default_history_scan_max_items_per_channel,
            )?,
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            operator_tokens,
            discord_token,
            discord_api_base,
            media_cache_dir,
            jobs,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("SENTINEL_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("SENTINEL_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: fn() -> T,
) -> Result<T, ConfigError> {
    match layered.remove(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default()),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

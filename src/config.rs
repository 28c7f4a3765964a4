//! Configuration module for feedrelay.

use serde::Deserialize;
use std::path::Path;

use crate::{RelayError, Result};

/// External email/list platform configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform API.
    #[serde(default)]
    pub api_url: String,
    /// API key for the platform.
    #[serde(default)]
    pub api_key: String,
    /// Sender address for transactional emails.
    #[serde(default = "default_from_email")]
    pub from_email: String,
    /// Template name prefix; the frequency name is appended
    /// (e.g. "newsletter-instant").
    #[serde(default = "default_template_prefix")]
    pub template_prefix: String,
    /// Total request timeout in seconds.
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
    /// Number of retry attempts for transient failures.
    #[serde(default = "default_platform_retries")]
    pub retry_attempts: u32,
    /// Initial backoff between retries in milliseconds (doubles per attempt).
    #[serde(default = "default_platform_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_from_email() -> String {
    "newsletter@example.com".to_string()
}

fn default_template_prefix() -> String {
    "newsletter".to_string()
}

fn default_platform_timeout() -> u64 {
    30
}

fn default_platform_retries() -> u32 {
    3
}

fn default_platform_backoff() -> u64 {
    500
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            from_email: default_from_email(),
            template_prefix: default_template_prefix(),
            timeout_secs: default_platform_timeout(),
            retry_attempts: default_platform_retries(),
            retry_backoff_ms: default_platform_backoff(),
        }
    }
}

/// Feed fetching configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Maximum number of feeds held in the fetch cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// How long stale cached data may substitute for a failed fetch,
    /// in seconds.
    #[serde(default = "default_max_stale")]
    pub max_stale_secs: u64,
    /// User agent string for feed requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024
}

fn default_cache_capacity() -> usize {
    100
}

fn default_max_stale() -> u64 {
    6 * 60 * 60
}

fn default_user_agent() -> String {
    "feedrelay/0.1 (RSS-to-email bridge)".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            cache_capacity: default_cache_capacity(),
            max_stale_secs: default_max_stale(),
            user_agent: default_user_agent(),
        }
    }
}

/// Polling schedule configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Timezone for fixed-time schedules (e.g. "Europe/London", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Minimum interval between instant polls, in minutes.
    #[serde(default = "default_instant_interval")]
    pub instant_interval_minutes: i64,
    /// Hour of day for the daily digest poll (0-23).
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,
    /// Minute of hour for the daily digest poll.
    #[serde(default)]
    pub daily_minute: u32,
    /// Hour of day for the weekly digest poll.
    #[serde(default = "default_weekly_hour")]
    pub weekly_hour: u32,
    /// Minute of hour for the weekly digest poll.
    #[serde(default)]
    pub weekly_minute: u32,
    /// Weekday for the weekly digest poll (e.g. "monday").
    #[serde(default = "default_weekly_day")]
    pub weekly_day: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_instant_interval() -> i64 {
    5
}

fn default_daily_hour() -> u32 {
    8
}

fn default_weekly_hour() -> u32 {
    8
}

fn default_weekly_day() -> String {
    "monday".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            instant_interval_minutes: default_instant_interval(),
            daily_hour: default_daily_hour(),
            daily_minute: 0,
            weekly_hour: default_weekly_hour(),
            weekly_minute: 0,
            weekly_day: default_weekly_day(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// External platform settings.
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Feed fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Polling schedule settings.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate required settings.
    ///
    /// Missing platform credentials are fatal at startup; the process
    /// must not start polling without them.
    pub fn validate(&self) -> Result<()> {
        if self.platform.api_url.is_empty() {
            return Err(RelayError::Config("platform.api_url is required".to_string()));
        }
        if self.platform.api_key.is_empty() {
            return Err(RelayError::Config("platform.api_key is required".to_string()));
        }
        Ok(())
    }
}

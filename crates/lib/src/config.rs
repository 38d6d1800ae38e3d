//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.marquee/config.json`) and environment.
//! Secrets and the talking default may come from the environment only; env values win over
//! the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LINE channel credentials and reply API endpoint.
    #[serde(default)]
    pub line: LineConfig,

    /// Initial value of the shared talking flag.
    #[serde(default)]
    pub talking: TalkingConfig,

    /// Trigger phrases and the fixed reply texts.
    #[serde(default)]
    pub triggers: TriggersConfig,

    /// Upcoming-release scrape target.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Dialogue database and connection pool bounds.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// How event timestamps are rendered before they are stored.
    #[serde(default)]
    pub timestamp: TimestampConfig,
}

/// Bind address and port for the webhook server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address (default "0.0.0.0"; the platform must reach the webhook).
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Port (default 8090).
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
            port: default_server_port(),
        }
    }
}

/// LINE Messaging API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Channel secret used to verify X-Line-Signature. Overridden by LINE_CHANNEL_SECRET env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,

    /// Channel access token for the reply API. Overridden by LINE_CHANNEL_ACCESS_TOKEN env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,

    /// Reply API base URL (default "https://api.line.me").
    #[serde(default = "default_reply_api_base")]
    pub reply_api_base: String,

    /// Timeout for one reply call, in seconds.
    #[serde(default = "default_reply_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_reply_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_reply_timeout_secs() -> u64 {
    10
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: None,
            channel_access_token: None,
            reply_api_base: default_reply_api_base(),
            timeout_secs: default_reply_timeout_secs(),
        }
    }
}

/// Talking flag default. Overridden by DEFAULT_TALKING env.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalkingConfig {
    #[serde(rename = "default", default = "default_true")]
    pub initial: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TalkingConfig {
    fn default() -> Self {
        Self { initial: true }
    }
}

/// Trigger phrases (matched against the raw message text) and the replies they produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggersConfig {
    /// Exact text that turns talking on.
    #[serde(default = "default_start_phrase")]
    pub start_phrase: String,

    /// Exact text that turns talking off.
    #[serde(default = "default_stop_phrase")]
    pub stop_phrase: String,

    /// Prefix of the release-digest command; an optional region code may follow.
    #[serde(default = "default_digest_command")]
    pub digest_command: String,

    #[serde(default = "default_greeting")]
    pub greeting: String,

    #[serde(default = "default_farewell")]
    pub farewell: String,

    /// Sent for any other text while talking is on.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_start_phrase() -> String {
    "說話".to_string()
}

fn default_stop_phrase() -> String {
    "閉嘴".to_string()
}

fn default_digest_command() -> String {
    "@Fl Movie".to_string()
}

fn default_greeting() -> String {
    "我可以說話囉，歡迎來跟我互動 ^_^ ".to_string()
}

fn default_farewell() -> String {
    "好的，我乖乖閉嘴 > <，如果想要我繼續說話，請跟我說 「說話」 > <".to_string()
}

fn default_placeholder() -> String {
    "test test".to_string()
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            start_phrase: default_start_phrase(),
            stop_phrase: default_stop_phrase(),
            digest_command: default_digest_command(),
            greeting: default_greeting(),
            farewell: default_farewell(),
            placeholder: default_placeholder(),
        }
    }
}

/// Scrape target for the upcoming-release digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestConfig {
    /// Calendar URL; `{region}` is replaced with the requested region code.
    #[serde(default = "default_digest_url_template")]
    pub url_template: String,

    /// Browser User-Agent; the calendar site rejects non-browser clients.
    #[serde(default = "default_digest_user_agent")]
    pub user_agent: String,

    /// Timeout for the single calendar fetch, in seconds.
    #[serde(default = "default_digest_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_digest_url_template() -> String {
    "https://www.imdb.com/calendar/?ref_=rlm&region={region}&type=MOVIE".to_string()
}

fn default_digest_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36".to_string()
}

fn default_digest_timeout_secs() -> u64 {
    15
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            url_template: default_digest_url_template(),
            user_agent: default_digest_user_agent(),
            timeout_secs: default_digest_timeout_secs(),
        }
    }
}

/// SQLite database file and pool bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Database file. Relative paths resolve against the config file's parent. Overridden by
    /// MARQUEE_DATABASE_PATH env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Connections opened when the pool is built.
    #[serde(default = "default_min_idle")]
    pub min_idle: usize,

    /// Connections kept open after being returned.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Upper bound on concurrently checked-out connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_min_idle() -> usize {
    1
}

fn default_max_idle() -> usize {
    20
}

fn default_max_connections() -> usize {
    20
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_idle: default_min_idle(),
            max_idle: default_max_idle(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Offset applied to event timestamps before formatting (`%Y-%m-%d %H:%M:%S`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampConfig {
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    env_non_empty("LINE_CHANNEL_SECRET")
        .or_else(|| config_non_empty(config.line.channel_secret.as_ref()))
}

/// Resolve the channel access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_channel_access_token(config: &Config) -> Option<String> {
    env_non_empty("LINE_CHANNEL_ACCESS_TOKEN")
        .or_else(|| config_non_empty(config.line.channel_access_token.as_ref()))
}

/// Resolve the initial talking flag: env DEFAULT_TALKING (or the legacy DEFALUT_TALKING)
/// overrides config.
pub fn resolve_default_talking(config: &Config) -> bool {
    env_non_empty("DEFAULT_TALKING")
        .or_else(|| env_non_empty("DEFALUT_TALKING"))
        .map(|v| parse_talking_flag(&v))
        .unwrap_or(config.talking.initial)
}

/// Only a case-insensitive "true" enables talking.
pub fn parse_talking_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Resolve the database file: env MARQUEE_DATABASE_PATH, then `database.path` (relative to the
/// config file's parent), then `marquee.db` next to the config file.
pub fn resolve_database_path(config: &Config, config_path: &Path) -> PathBuf {
    if let Some(p) = env_non_empty("MARQUEE_DATABASE_PATH") {
        return PathBuf::from(p);
    }
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.database.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("marquee.db"),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MARQUEE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".marquee").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, the default path, or MARQUEE_CONFIG_PATH. Missing file =>
/// default config.
/// Returns the config and the path that was used (for resolving the database file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

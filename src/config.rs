//! Runtime settings loaded from the environment.
//!
//! [`Settings`] is built once at process start and shared by `Arc`. Every
//! value has a default; a variable that is set but empty counts as unset.
//! Range checks follow the CLI bounds so a bad environment fails loudly
//! instead of being clamped.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::user_agent;

pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";
pub const DEFAULT_MEDIA_URL_PREFIX: &str = "/downloads";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const DEFAULT_GRAPH_API_BASE_URL: &str = "https://graph.facebook.com/v18.0";

/// Errors produced while reading settings.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A variable is set to a value outside its accepted form or range
    #[error("invalid value for `{key}`: '{value}'\n  Suggestion: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, expected: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Process-wide configuration.
///
/// Secrets are held as plain strings but never printed: the `Debug` impl
/// redacts them.
#[derive(Clone)]
pub struct Settings {
    pub download_dir: PathBuf,
    /// Public prefix for media URLs in responses (`{prefix}/{key}/{file}`).
    pub media_url_prefix: String,
    /// Upper bound for one backend or analyzer call.
    pub request_timeout: Duration,
    /// Attempts per backend, including the first.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub ytdlp_path: PathBuf,
    pub user_agent: String,
    pub enable_unauthenticated: bool,
    /// Write `{key}_metadata.json` next to committed media.
    pub save_metadata: bool,
    pub instagram_username: Option<String>,
    pub instagram_password: Option<String>,
    pub instagram_cookies_file: Option<PathBuf>,
    pub graph_api_token: Option<String>,
    pub graph_api_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            media_url_prefix: DEFAULT_MEDIA_URL_PREFIX.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            ytdlp_path: PathBuf::from(DEFAULT_YTDLP_PATH),
            user_agent: user_agent::default_extraction_user_agent(),
            enable_unauthenticated: true,
            save_metadata: true,
            instagram_username: None,
            instagram_password: None,
            instagram_cookies_file: None,
            graph_api_token: None,
            graph_api_base_url: DEFAULT_GRAPH_API_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Self::default();

        if let Some(dir) = get("SNS_DOWNLOAD_DIR") {
            settings.download_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = get("SNS_MEDIA_URL_PREFIX") {
            settings.media_url_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(raw) = get("SNS_REQUEST_TIMEOUT_SECS") {
            let secs = parse_in_range("SNS_REQUEST_TIMEOUT_SECS", &raw, 1..=3600)?;
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("SNS_MAX_RETRIES") {
            let attempts = parse_in_range("SNS_MAX_RETRIES", &raw, 1..=10)?;
            settings.max_attempts = u32::try_from(attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS);
        }
        if let Some(raw) = get("SNS_RETRY_BASE_DELAY_MS") {
            let ms = parse_in_range("SNS_RETRY_BASE_DELAY_MS", &raw, 0..=60_000)?;
            settings.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(path) = get("SNS_YTDLP_PATH") {
            settings.ytdlp_path = PathBuf::from(path);
        }
        if let Some(ua) = get("SNS_USER_AGENT") {
            settings.user_agent = ua;
        }
        if let Some(raw) = get("SNS_ENABLE_UNAUTHENTICATED") {
            settings.enable_unauthenticated = parse_bool("SNS_ENABLE_UNAUTHENTICATED", &raw)?;
        }
        if let Some(raw) = get("SNS_SAVE_METADATA") {
            settings.save_metadata = parse_bool("SNS_SAVE_METADATA", &raw)?;
        }
        settings.instagram_username = get("INSTAGRAM_USERNAME");
        settings.instagram_password = get("INSTAGRAM_PASSWORD");
        settings.instagram_cookies_file = get("INSTAGRAM_COOKIES_FILE").map(PathBuf::from);
        settings.graph_api_token = get("INSTAGRAM_GRAPH_API_TOKEN");
        if let Some(base) = get("SNS_GRAPH_API_BASE_URL") {
            if url::Url::parse(&base).is_err() {
                return Err(ConfigError::invalid(
                    "SNS_GRAPH_API_BASE_URL",
                    &base,
                    "an absolute http(s) URL",
                ));
            }
            settings.graph_api_base_url = base.trim_end_matches('/').to_string();
        }

        debug!(settings = ?settings, "settings loaded");
        Ok(settings)
    }

    /// Username and password are both present.
    #[must_use]
    pub fn has_account_credentials(&self) -> bool {
        self.instagram_username.is_some() && self.instagram_password.is_some()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact<T>(value: Option<&T>) -> &'static str {
            if value.is_some() { "<redacted>" } else { "<unset>" }
        }

        f.debug_struct("Settings")
            .field("download_dir", &self.download_dir)
            .field("media_url_prefix", &self.media_url_prefix)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("ytdlp_path", &self.ytdlp_path)
            .field("user_agent", &self.user_agent)
            .field("enable_unauthenticated", &self.enable_unauthenticated)
            .field("save_metadata", &self.save_metadata)
            .field("instagram_username", &self.instagram_username)
            .field("instagram_password", &redact(self.instagram_password.as_ref()))
            .field("instagram_cookies_file", &self.instagram_cookies_file)
            .field("graph_api_token", &redact(self.graph_api_token.as_ref()))
            .field("graph_api_base_url", &self.graph_api_base_url)
            .finish()
    }
}

fn parse_in_range(
    key: &str,
    raw: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let expected = format!("an integer in {}..={}", range.start(), range.end());
    match raw.parse::<u64>() {
        Ok(value) if range.contains(&value) => Ok(value),
        _ => Err(ConfigError::invalid(key, raw, &expected)),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "true/false, yes/no, on/off or 1/0")),
    }
}

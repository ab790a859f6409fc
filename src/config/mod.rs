//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::PathBuf, str::FromStr, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "clipasa";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 6000;
const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_STATE_FILE: &str = "clipasa-session.json";

/// Fully-resolved client settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub feed: FeedSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// The GraphQL endpoint URL. The only setting without a default.
    pub endpoint: Url,
    pub request_timeout: Duration,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetrySettings {
    /// Exponential backoff for the given retry attempt (1-based), capped at
    /// the configured maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub state_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("missing configuration for `{key}`")]
    Missing { key: &'static str },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
pub fn load() -> Result<Settings, LoadError> {
    load_from(None)
}

/// Like [`load`], with an extra required configuration file layered on top.
pub fn load_from(config_file: Option<&std::path::Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CLIPASA").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    feed: RawFeedSettings,
    session: RawSessionSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    endpoint: Option<String>,
    request_timeout_seconds: Option<u64>,
    retry_max_attempts: Option<u32>,
    retry_initial_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            feed,
            session,
            logging,
        } = raw;

        Ok(Self {
            api: build_api_settings(api)?,
            feed: build_feed_settings(feed)?,
            session: build_session_settings(session)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let endpoint = api
        .endpoint
        .ok_or(LoadError::Missing {
            key: "api.endpoint",
        })?
        .parse::<Url>()
        .map_err(|err| LoadError::invalid("api.endpoint", format!("failed to parse: {err}")))?;

    let timeout_secs = api
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_attempts = api.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
    let initial_delay_ms = api
        .retry_initial_delay_ms
        .unwrap_or(DEFAULT_RETRY_INITIAL_DELAY_MS);
    let max_delay_ms = api.retry_max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS);
    if max_delay_ms < initial_delay_ms {
        return Err(LoadError::invalid(
            "api.retry_max_delay_ms",
            "must not be below the initial delay",
        ));
    }

    Ok(ApiSettings {
        endpoint,
        request_timeout: Duration::from_secs(timeout_secs),
        retry: RetrySettings {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        },
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let page_size = feed.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(LoadError::invalid(
            "feed.page_size",
            "must be greater than zero",
        ));
    }
    Ok(FeedSettings { page_size })
}

fn build_session_settings(session: RawSessionSettings) -> Result<SessionSettings, LoadError> {
    let state_file = session
        .state_file
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
    if state_file.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "session.state_file",
            "path must not be empty",
        ));
    }
    Ok(SessionSettings { state_file })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

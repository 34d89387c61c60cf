// src/config.rs
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, WorkspaceError};

pub const DEFAULT_PROBLEMS_API_BASE: &str = "http://localhost:3000/api/v1";
pub const DEFAULT_SUBMISSIONS_API_BASE: &str = "http://localhost:4000/api/v1";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:3001";
pub const DEFAULT_USER_ID: &str = "1";

/// How the push channel behaves after an established connection drops.
///
/// The initial connect is never retried; this only governs recovery of a
/// connection that was live at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts per outage. `0` disables reconnection.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before reconnect `attempt` (1-based): doubles from
    /// `initial_delay`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Client configuration for one workspace process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub problems_api_base: String,
    pub submissions_api_base: String,
    pub socket_url: String,
    pub user_id: String,
    pub request_timeout: Duration,
    pub result_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            problems_api_base: DEFAULT_PROBLEMS_API_BASE.to_string(),
            submissions_api_base: DEFAULT_SUBMISSIONS_API_BASE.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            request_timeout: Duration::from_secs(10),
            result_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// On-disk form of [`AppConfig`]. Every field is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    problems_api_base: Option<String>,
    submissions_api_base: Option<String>,
    socket_url: Option<String>,
    user_id: Option<String>,
    request_timeout_secs: Option<u64>,
    result_timeout_secs: Option<u64>,
    #[serde(default)]
    reconnect: Option<FileReconnect>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FileReconnect {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = AppConfig {
            problems_api_base: std::env::var("PROBLEMS_API_BASE")
                .unwrap_or(defaults.problems_api_base),
            submissions_api_base: std::env::var("SUBMISSIONS_API_BASE")
                .unwrap_or(defaults.submissions_api_base),
            socket_url: std::env::var("SOCKET_URL").unwrap_or(defaults.socket_url),
            user_id: std::env::var("USER_ID").unwrap_or(defaults.user_id),
            request_timeout: env_number("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            result_timeout: env_number("RESULT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_timeout),
            reconnect: ReconnectPolicy {
                max_attempts: env_number("RECONNECT_MAX_ATTEMPTS")?
                    .map(|n| attempts_from(n, "RECONNECT_MAX_ATTEMPTS"))
                    .transpose()?
                    .unwrap_or(defaults.reconnect.max_attempts),
                initial_delay: env_number("RECONNECT_INITIAL_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.initial_delay),
                max_delay: env_number("RECONNECT_MAX_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.max_delay),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text)?;
        let defaults = Self::default();
        let reconnect = file.reconnect.unwrap_or_default();

        let config = AppConfig {
            problems_api_base: file.problems_api_base.unwrap_or(defaults.problems_api_base),
            submissions_api_base: file
                .submissions_api_base
                .unwrap_or(defaults.submissions_api_base),
            socket_url: file.socket_url.unwrap_or(defaults.socket_url),
            user_id: file.user_id.unwrap_or(defaults.user_id),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            result_timeout: file
                .result_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_timeout),
            reconnect: ReconnectPolicy {
                max_attempts: reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
                initial_delay: reconnect
                    .initial_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.initial_delay),
                max_delay: reconnect
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.max_delay),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("problems_api_base", &self.problems_api_base),
            ("submissions_api_base", &self.submissions_api_base),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(WorkspaceError::Config(format!(
                    "{name} must be an http(s) URL, got '{value}'"
                )));
            }
        }

        if !(self.socket_url.starts_with("ws://") || self.socket_url.starts_with("wss://")) {
            return Err(WorkspaceError::Config(format!(
                "socket_url must be a ws(s) URL, got '{}'",
                self.socket_url
            )));
        }

        if self.user_id.trim().is_empty() {
            return Err(WorkspaceError::Config("user_id must not be empty".to_string()));
        }

        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(WorkspaceError::Config(
                "reconnect max_delay must not be shorter than initial_delay".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| WorkspaceError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn attempts_from(n: u64, key: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| WorkspaceError::Config(format!("{key} is out of range, got {n}")))
}

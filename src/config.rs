//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_STORE_PATH: &str = ".postboard/session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API base URL '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin, no trailing slash.
    pub api_base_url: String,
    /// Location of the durable session file.
    pub store_path: PathBuf,
    pub timeouts: HttpTimeouts,
}

impl ClientConfig {
    /// Build a config with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if `api_base_url` is not an http(s) URL.
    pub fn new(api_base_url: &str, store_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: normalize_base_url(api_base_url)?,
            store_path: store_path.into(),
            timeouts: HttpTimeouts::default(),
        })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `POSTBOARD_API_URL`: default `http://localhost:3000`
    /// - `POSTBOARD_STORE_PATH`: default `.postboard/session.json`
    /// - `POSTBOARD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `POSTBOARD_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-http(s) API URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = std::env::var("POSTBOARD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let store_path = std::env::var("POSTBOARD_STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.to_owned());
        let timeouts = HttpTimeouts {
            request_secs: env_parse_u64("POSTBOARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("POSTBOARD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(Self { api_base_url: normalize_base_url(&api_base_url)?, store_path: store_path.into(), timeouts })
    }

    /// Replace the API base URL, e.g. from a command-line flag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for a non-http(s) URL.
    pub fn with_api_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base_url = normalize_base_url(raw)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

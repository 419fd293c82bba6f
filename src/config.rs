//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::query::QueryOptions;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_QUERY_RETRY: u32 = 3;
pub const DEFAULT_QUERY_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_QUERY_RETRY_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

/// Values that take precedence over the environment, such as CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL that `/auth/me` and `/site-config` are resolved against.
    pub api_base_url: String,
    /// Where unauthenticated visitors are sent.
    pub login_path: String,
    /// Sent as the `session_token` cookie when present.
    pub session_token: Option<String>,
    pub timeouts: HttpTimeouts,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            session_token: None,
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            retry: RetryPolicy {
                retries: DEFAULT_QUERY_RETRY,
                base_ms: DEFAULT_QUERY_RETRY_BASE_MS,
                max_ms: DEFAULT_QUERY_RETRY_MAX_MS,
            },
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `SITEGATE_API_BASE_URL`: default `http://127.0.0.1:3000/api`
    /// - `SITEGATE_LOGIN_PATH`: default `/login`
    /// - `SITEGATE_SESSION_TOKEN`: no cookie when absent or empty
    /// - `SITEGATE_REQUEST_TIMEOUT_SECS`: default 10
    /// - `SITEGATE_CONNECT_TIMEOUT_SECS`: default 5
    /// - `SITEGATE_QUERY_RETRY`: default 3
    /// - `SITEGATE_QUERY_RETRY_BASE_MS`: default 1000
    /// - `SITEGATE_QUERY_RETRY_MAX_MS`: default 30000
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the base URL is not http(s) or
    /// the login path is not absolute.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`ClientConfig::from_env`] with `overrides` applied before validation.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`]; overridden values are checked the same way.
    pub fn from_env_with(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup_with(|key| std::env::var(key).ok(), overrides)
    }

    /// [`ClientConfig::from_lookup`] where a non-blank override wins over the
    /// looked-up value.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup_with(
        lookup: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            let overridden = match key {
                "SITEGATE_API_BASE_URL" => overrides.api_base_url.as_ref(),
                "SITEGATE_SESSION_TOKEN" => overrides.session_token.as_ref(),
                _ => None,
            };
            overridden
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .or_else(|| lookup(key))
        })
    }

    /// Same as [`ClientConfig::from_env`] but reads through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = lookup("SITEGATE_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "SITEGATE_API_BASE_URL",
                reason: format!("expected http(s) URL, got '{api_base_url}'"),
            });
        }

        let login_path = lookup("SITEGATE_LOGIN_PATH").unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_owned());
        if !login_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "SITEGATE_LOGIN_PATH",
                reason: format!("expected absolute path, got '{login_path}'"),
            });
        }

        let session_token = lookup("SITEGATE_SESSION_TOKEN")
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());

        let parse = |key: &str, default: u64| parse_or(lookup(key), default);
        let timeouts = HttpTimeouts {
            request_secs: parse("SITEGATE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse("SITEGATE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let retry = RetryPolicy {
            retries: parse_or(lookup("SITEGATE_QUERY_RETRY"), DEFAULT_QUERY_RETRY),
            base_ms: parse("SITEGATE_QUERY_RETRY_BASE_MS", DEFAULT_QUERY_RETRY_BASE_MS),
            max_ms: parse("SITEGATE_QUERY_RETRY_MAX_MS", DEFAULT_QUERY_RETRY_MAX_MS),
        };

        Ok(Self { api_base_url, login_path, session_token, timeouts, retry })
    }

    /// Query options matching this config's retry policy, stale-always.
    #[must_use]
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            retry: self.retry.retries,
            retry_base_delay: Duration::from_millis(self.retry.base_ms),
            retry_max_delay: Duration::from_millis(self.retry.max_ms),
            ..QueryOptions::default()
        }
    }
}

fn parse_or<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr,
{
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

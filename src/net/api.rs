//! REST client for the identity and site-config endpoints.
//!
//! ERROR HANDLING
//! ==============
//! "Not signed in" and "key not set" are answers, not failures: `401`/`403`
//! on `/auth/me` and `404` on `/site-config/{key}` come back as `Ok(None)`.
//! Everything else that is not a 2xx becomes [`ApiError::Status`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::types::{ApiError, CurrentUser, SiteConfig, SiteConfigEntry};
use crate::config::ClientConfig;

/// Source of the "who is the current user" answer.
#[async_trait]
pub trait CurrentUserSource: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the identity lookup itself fails.
    async fn current_user(&self) -> Result<Option<CurrentUser>, ApiError>;
}

/// Remote key-value configuration store.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Read the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the read fails.
    async fn all(&self) -> Result<SiteConfig, ApiError>;

    /// Read one key. `Ok(None)` when the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the read fails.
    async fn get(&self, key: &str) -> Result<Option<Value>, ApiError>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the write is rejected or fails.
    async fn put(&self, key: &str, value: Value) -> Result<(), ApiError>;
}

/// HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Build a client with the configured timeouts and session cookie.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the base URL does not parse, the
    /// session token is not a valid header value, or the client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::ClientBuild(format!("not a base URL: {base_url}")));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.session_token {
            let cookie = HeaderValue::from_str(&format!("session_token={token}"))
                .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
            headers.insert(COOKIE, cookie);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /auth/me`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, an unexpected status or
    /// an undecodable body.
    pub async fn fetch_current_user(&self) -> Result<Option<CurrentUser>, ApiError> {
        let url = self.url(&["auth", "me"]);
        self.get_json(url, &[StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND])
            .await
    }

    /// `GET /site-config`. A `null` body reads as an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, an unexpected status or
    /// an undecodable body.
    pub async fn fetch_site_config(&self) -> Result<SiteConfig, ApiError> {
        let url = self.url(&["site-config"]);
        let config: Option<Option<SiteConfig>> = self.get_json(url, &[]).await?;
        Ok(config.flatten().unwrap_or_default())
    }

    /// `GET /site-config/{key}`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, an unexpected status or
    /// an undecodable body.
    pub async fn fetch_site_config_key(&self, key: &str) -> Result<Option<Value>, ApiError> {
        let url = self.url(&["site-config", key]);
        let entry: Option<SiteConfigEntry> = self.get_json(url, &[StatusCode::NOT_FOUND]).await?;
        Ok(entry.and_then(|e| e.value))
    }

    /// `PUT /site-config/{key}` with body `{ "value": ... }`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or a non-success status.
    pub async fn update_site_config_key(&self, key: &str, value: &Value) -> Result<(), ApiError> {
        let url = self.url(&["site-config", key]);
        debug!(%url, "PUT");
        let resp = self
            .http
            .put(url.clone())
            .json(&serde_json::json!({ "value": value }))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status { status: resp.status().as_u16(), path: url.path().to_owned() });
        }
        Ok(())
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET `url` and decode the body. Statuses in `absent` map to `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url, absent: &[StatusCode]) -> Result<Option<T>, ApiError> {
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = resp.status();
        if absent.contains(&status) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), path: url.path().to_owned() });
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CurrentUserSource for ApiClient {
    async fn current_user(&self) -> Result<Option<CurrentUser>, ApiError> {
        self.fetch_current_user().await
    }
}

#[async_trait]
impl ConfigSource for ApiClient {
    async fn all(&self) -> Result<SiteConfig, ApiError> {
        self.fetch_site_config().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, ApiError> {
        self.fetch_site_config_key(key).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), ApiError> {
        self.update_site_config_key(key, &value).await
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

//! Accessors over the remote site configuration.
//!
//! ERROR HANDLING
//! ==============
//! Read failures never reach the caller as `Err`. The whole-config accessor
//! coalesces "not loaded", "failed" and `null` to an empty mapping, and the
//! exam-category accessor falls back to the built-in list. The failure stays
//! visible through `error()` for diagnostics.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::known::{ConfigValue, ConfigValueError};
use crate::net::api::ConfigSource;
use crate::net::types::{ApiError, SiteConfig};
use crate::query::{FocusManager, QueryCache, QueryFn, QueryKey, QueryObserver, QueryOptions};
use crate::query_key;

pub const SITE_CONFIG_KEY: &str = "site-config";

#[must_use]
pub fn site_config_key() -> QueryKey {
    query_key![SITE_CONFIG_KEY]
}

#[must_use]
pub fn site_config_entry_key(key: &str) -> QueryKey {
    site_config_key().with(key)
}

struct AllFn(Arc<dyn ConfigSource>);

#[async_trait::async_trait]
impl QueryFn<SiteConfig> for AllFn {
    async fn fetch(&self) -> Result<SiteConfig, ApiError> {
        self.0.all().await
    }
}

struct KeyFn {
    source: Arc<dyn ConfigSource>,
    key: String,
}

#[async_trait::async_trait]
impl QueryFn<Option<Value>> for KeyFn {
    async fn fetch(&self) -> Result<Option<Value>, ApiError> {
        self.source.get(&self.key).await
    }
}

/// Client-side cache of the remote key-value configuration.
#[derive(Clone)]
pub struct ConfigCache {
    source: Arc<dyn ConfigSource>,
    all: QueryCache<SiteConfig>,
    entries: QueryCache<Option<Value>>,
}

impl ConfigCache {
    #[must_use]
    pub fn new(source: Arc<dyn ConfigSource>, options: QueryOptions, focus: &FocusManager) -> Self {
        Self {
            source,
            all: QueryCache::new("site-config", options.clone(), focus),
            entries: QueryCache::new("site-config-entry", options, focus),
        }
    }

    /// Mount a consumer of the whole configuration.
    #[must_use]
    pub fn get_all(&self) -> ConfigView {
        let observer = self
            .all
            .observe(site_config_key(), Arc::new(AllFn(Arc::clone(&self.source))));
        ConfigView { observer }
    }

    /// Mount a consumer of one key.
    #[must_use]
    pub fn get_key(&self, key: &str) -> ConfigKeyView {
        let fetcher = KeyFn { source: Arc::clone(&self.source), key: key.to_owned() };
        let observer = self
            .entries
            .observe(site_config_entry_key(key), Arc::new(fetcher));
        ConfigKeyView { key: key.to_owned(), observer }
    }

    /// Mount a consumer of the exam category list.
    #[must_use]
    pub fn get_exam_categories(&self) -> ExamCategoriesView {
        ExamCategoriesView { config: self.get_all() }
    }

    /// Write `value` under `key`, then refetch every mounted config query.
    /// Nothing is written to the local cache; the next read decides.
    ///
    /// Returns how many refetches were started.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the failed write; no refetch happens then.
    pub async fn set_key(&self, key: &str, value: Value) -> Result<usize, ApiError> {
        self.source.put(key, value).await?;
        let prefix = site_config_key();
        let refetched = self.all.invalidate(&prefix) + self.entries.invalidate(&prefix);
        info!(key, refetched, "site config updated");
        Ok(refetched)
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Mounted whole-config consumer. Unmounts on drop.
pub struct ConfigView {
    observer: QueryObserver<SiteConfig>,
}

impl ConfigView {
    /// The configuration, empty until loaded or when the read failed.
    #[must_use]
    pub fn config(&self) -> SiteConfig {
        self.observer.data().unwrap_or_default()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.observer.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.observer.error()
    }

    pub fn refetch(&self) {
        self.observer.refetch();
    }

    pub async fn changed(&mut self) -> SiteConfig {
        self.observer.changed().await.data.unwrap_or_default()
    }

    pub async fn settled(&mut self) -> SiteConfig {
        self.observer.settled().await.data.unwrap_or_default()
    }
}

/// Mounted single-key consumer. Unmounts on drop.
pub struct ConfigKeyView {
    key: String,
    observer: QueryObserver<Option<Value>>,
}

impl ConfigKeyView {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `None` when the key does not exist or has not loaded yet; tell them
    /// apart with [`ConfigKeyView::is_loading`] and [`ConfigKeyView::error`].
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.observer.data().flatten()
    }

    /// The value interpreted for its key.
    #[must_use]
    pub fn typed(&self) -> Option<Result<ConfigValue, ConfigValueError>> {
        self.value()
            .map(|value| ConfigValue::parse(&self.key, &value))
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.observer.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.observer.error()
    }

    pub fn refetch(&self) {
        self.observer.refetch();
    }

    pub async fn settled(&mut self) -> Option<Value> {
        self.observer.settled().await.data.flatten()
    }
}

/// Mounted exam-category consumer. Unmounts on drop.
pub struct ExamCategoriesView {
    config: ConfigView,
}

impl ExamCategoriesView {
    /// Configured categories, or the built-in list when none are configured
    /// or the read failed.
    #[must_use]
    pub fn exam_categories(&self) -> Vec<String> {
        self.config.config().exam_categories_or_default()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.config.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.config.error()
    }

    pub fn refetch(&self) {
        self.config.refetch();
    }

    pub async fn settled(&mut self) -> Vec<String> {
        self.config.settled().await.exam_categories_or_default()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;

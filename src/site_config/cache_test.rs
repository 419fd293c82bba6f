use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::site_config::known::default_exam_categories;

/// In-memory remote store with call counters and a failure switch.
#[derive(Default)]
struct MemoryStore {
    values: Mutex<serde_json::Map<String, Value>>,
    failing: AtomicBool,
    reject_writes: AtomicBool,
    all_calls: AtomicUsize,
    key_calls: Mutex<HashMap<String, usize>>,
}

impl MemoryStore {
    fn with(value: Value) -> Arc<Self> {
        let store = Self::default();
        if let Value::Object(map) = value {
            *store.values.lock().unwrap() = map;
        }
        Arc::new(store)
    }

    fn all_calls(&self) -> usize {
        self.all_calls.load(Ordering::SeqCst)
    }

    fn key_calls(&self, key: &str) -> usize {
        self.key_calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn fail_with(&self) -> Result<(), ApiError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ApiError::Request("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ConfigSource for MemoryStore {
    async fn all(&self) -> Result<SiteConfig, ApiError> {
        self.all_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_with()?;
        Ok(SiteConfig::new(self.values.lock().unwrap().clone()))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, ApiError> {
        *self.key_calls.lock().unwrap().entry(key.to_owned()).or_default() += 1;
        self.fail_with()?;
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), ApiError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(ApiError::Status { status: 403, path: format!("/api/site-config/{key}") });
        }
        self.values.lock().unwrap().insert(key.to_owned(), value);
        Ok(())
    }
}

fn options() -> QueryOptions {
    QueryOptions { retry: 0, retry_base_delay: Duration::from_millis(1), ..QueryOptions::default() }
}

fn cache_over(store: &Arc<MemoryStore>, focus: &FocusManager) -> ConfigCache {
    ConfigCache::new(store.clone(), options(), focus)
}

// =============================================================================
// get_all
// =============================================================================

#[tokio::test]
async fn get_all_is_empty_mapping_before_load() {
    let store = MemoryStore::with(json!({ "bannerText": "Hi" }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_all();
    assert!(view.is_loading());
    assert!(view.config().is_empty());

    let config = view.settled().await;
    assert_eq!(config.get("bannerText"), Some(&json!("Hi")));
    assert!(!view.is_loading());
}

#[tokio::test]
async fn get_all_is_empty_mapping_on_error() {
    let store = MemoryStore::with(json!({ "bannerText": "Hi" }));
    store.failing.store(true, Ordering::SeqCst);
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_all();
    let config = view.settled().await;

    assert!(config.is_empty());
    assert!(view.config().is_empty());
    assert!(matches!(view.error(), Some(ApiError::Request(_))));
}

#[tokio::test]
async fn refetch_picks_up_remote_change() {
    let store = MemoryStore::with(json!({ "bannerText": "Hi" }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_all();
    view.settled().await;
    store
        .values
        .lock()
        .unwrap()
        .insert("bannerText".into(), json!("Bye"));

    view.refetch();
    let config = view.settled().await;
    assert_eq!(config.get("bannerText"), Some(&json!("Bye")));
    assert_eq!(store.all_calls(), 2);
}

// =============================================================================
// get_key
// =============================================================================

#[tokio::test]
async fn get_key_returns_value() {
    let store = MemoryStore::with(json!({ "examCategories": ["A"] }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_key("examCategories");
    assert!(view.value().is_none());
    assert!(view.is_loading());

    assert_eq!(view.settled().await, Some(json!(["A"])));
    assert_eq!(view.key(), "examCategories");
    assert!(matches!(view.typed(), Some(Ok(ConfigValue::ExamCategories(_)))));
}

#[tokio::test]
async fn get_key_absent_is_none_without_error() {
    let store = MemoryStore::with(json!({}));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_key("missing");
    assert!(view.settled().await.is_none());
    assert!(!view.is_loading());
    assert!(view.error().is_none());
}

#[tokio::test]
async fn get_key_failure_is_none_with_error() {
    let store = MemoryStore::with(json!({ "bannerText": "Hi" }));
    store.failing.store(true, Ordering::SeqCst);
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_key("bannerText");
    assert!(view.settled().await.is_none());
    assert!(view.error().is_some());
}

#[tokio::test]
async fn key_and_category_views_refetch_on_demand() {
    let store = MemoryStore::with(json!({ "examCategories": ["A"] }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut entry = cache.get_key("examCategories");
    let mut categories = cache.get_exam_categories();
    entry.settled().await;
    categories.settled().await;
    store
        .values
        .lock()
        .unwrap()
        .insert("examCategories".into(), json!(["A", "B"]));

    entry.refetch();
    categories.refetch();
    assert_eq!(entry.settled().await, Some(json!(["A", "B"])));
    assert_eq!(categories.settled().await, vec!["A", "B"]);
    assert_eq!(store.key_calls("examCategories"), 2);
    assert_eq!(store.all_calls(), 2);
}

// =============================================================================
// get_exam_categories
// =============================================================================

#[tokio::test]
async fn exam_categories_from_remote_config() {
    let store = MemoryStore::with(json!({ "examCategories": ["A", "B"] }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_exam_categories();
    assert_eq!(view.settled().await, vec!["A", "B"]);
    assert!(view.error().is_none());
}

#[tokio::test]
async fn exam_categories_fall_back_when_unconfigured() {
    let store = MemoryStore::with(json!({}));
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_exam_categories();
    assert_eq!(view.settled().await, default_exam_categories());
    assert!(view.error().is_none());
}

#[tokio::test]
async fn exam_categories_fall_back_on_fetch_error() {
    let store = MemoryStore::with(json!({ "examCategories": ["A", "B"] }));
    store.failing.store(true, Ordering::SeqCst);
    let cache = cache_over(&store, &FocusManager::new());

    let mut view = cache.get_exam_categories();
    assert_eq!(view.settled().await, default_exam_categories());
    assert!(view.error().is_some());
    assert!(!view.is_loading());
}

#[tokio::test]
async fn exam_categories_use_fallback_while_loading() {
    let store = MemoryStore::with(json!({ "examCategories": ["A", "B"] }));
    let cache = cache_over(&store, &FocusManager::new());

    let view = cache.get_exam_categories();
    assert!(view.is_loading());
    assert_eq!(view.exam_categories(), default_exam_categories());
}

// =============================================================================
// Revalidation triggers
// =============================================================================

#[tokio::test]
async fn focus_refetches_each_mounted_config_key_once() {
    let store = MemoryStore::with(json!({ "examCategories": ["A"], "bannerText": "Hi" }));
    let focus = FocusManager::new();
    let cache = cache_over(&store, &focus);

    let mut all = cache.get_all();
    let mut categories = cache.get_exam_categories();
    let mut banner = cache.get_key("bannerText");
    all.settled().await;
    categories.settled().await;
    banner.settled().await;
    assert_eq!(store.all_calls(), 1);
    assert_eq!(store.key_calls("bannerText"), 1);

    assert_eq!(focus.focus(), 2);
    all.settled().await;
    banner.settled().await;

    assert_eq!(store.all_calls(), 2);
    assert_eq!(store.key_calls("bannerText"), 2);
}

#[tokio::test]
async fn remount_revalidates() {
    let store = MemoryStore::with(json!({ "examCategories": ["A"] }));
    let cache = cache_over(&store, &FocusManager::new());

    let mut first = cache.get_exam_categories();
    first.settled().await;
    drop(first);

    let mut second = cache.get_exam_categories();
    assert_eq!(second.exam_categories(), vec!["A"]);
    second.settled().await;
    assert_eq!(store.all_calls(), 2);
}

// =============================================================================
// set_key
// =============================================================================

#[tokio::test]
async fn set_key_invalidates_mounted_views() {
    let store = MemoryStore::with(json!({}));
    let cache = cache_over(&store, &FocusManager::new());

    let mut categories = cache.get_exam_categories();
    let mut entry = cache.get_key("examCategories");
    assert_eq!(categories.settled().await, default_exam_categories());
    assert!(entry.settled().await.is_none());

    let refetched = cache
        .set_key("examCategories", json!(["NEET", "GATE"]))
        .await
        .unwrap();
    assert_eq!(refetched, 2);

    assert_eq!(categories.settled().await, vec!["NEET", "GATE"]);
    assert_eq!(entry.settled().await, Some(json!(["NEET", "GATE"])));
}

#[tokio::test]
async fn rejected_write_leaves_cache_untouched() {
    let store = MemoryStore::with(json!({ "examCategories": ["A"] }));
    store.reject_writes.store(true, Ordering::SeqCst);
    let cache = cache_over(&store, &FocusManager::new());

    let mut categories = cache.get_exam_categories();
    categories.settled().await;

    let err = cache.set_key("examCategories", json!(["B"])).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 403, .. }));
    assert_eq!(categories.exam_categories(), vec!["A"]);
    assert_eq!(store.all_calls(), 1);
}

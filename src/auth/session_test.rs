use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::auth::gate::{AuthGate, GateDecision, Navigator, RouteGuardSpec};
use crate::query::{FocusManager, QueryOptions};

/// Answers from a queue, repeating the last answer once drained.
struct ScriptedSource {
    answers: Mutex<Vec<Result<Option<CurrentUser>, ApiError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(answers: Vec<Result<Option<CurrentUser>, ApiError>>) -> Arc<Self> {
        Arc::new(Self { answers: Mutex::new(answers), calls: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl CurrentUserSource for ScriptedSource {
    async fn current_user(&self) -> Result<Option<CurrentUser>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 { answers.remove(0) } else { answers[0].clone() }
    }
}

#[derive(Default)]
struct CountingNavigator {
    calls: AtomicUsize,
}

impl Navigator for CountingNavigator {
    fn navigate(&self, _path: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn cache() -> CurrentUserCache {
    let options = QueryOptions { retry: 0, retry_base_delay: Duration::from_millis(1), ..QueryOptions::default() };
    QueryCache::new("current-user", options, &FocusManager::new())
}

// =============================================================================
// auth_state_from
// =============================================================================

#[test]
fn fresh_state_is_loading() {
    assert_eq!(auth_state_from(&QueryState::default()), AuthQueryState::Loading);
}

#[test]
fn fetching_without_data_is_loading() {
    let state = QueryState { is_loading: true, is_fetching: true, ..QueryState::default() };
    assert_eq!(auth_state_from(&state), AuthQueryState::Loading);
}

#[test]
fn resolved_none_is_signed_out() {
    let state = QueryState { data: Some(None), ..QueryState::default() };
    assert_eq!(auth_state_from(&state), AuthQueryState::Resolved(None));
}

#[test]
fn failed_lookup_without_data_is_signed_out() {
    let state = QueryState { error: Some(ApiError::Request("down".into())), ..QueryState::default() };
    assert_eq!(auth_state_from(&state), AuthQueryState::Resolved(None));
}

#[test]
fn known_user_survives_background_refetch_and_failure() {
    let user = CurrentUser::new("u-1", "admin");
    let state = QueryState {
        data: Some(Some(user.clone())),
        error: Some(ApiError::Request("down".into())),
        is_fetching: true,
        ..QueryState::default()
    };
    assert_eq!(auth_state_from(&state), AuthQueryState::Resolved(Some(user)));
}

// =============================================================================
// CurrentUserQuery
// =============================================================================

#[tokio::test]
async fn mount_starts_loading_then_resolves_user() {
    let source = ScriptedSource::new(vec![Ok(Some(CurrentUser::new("u-1", "admin")))]);
    let cache = cache();
    let mut query = CurrentUserQuery::mount(&cache, source.clone());

    assert_eq!(query.auth_state(), AuthQueryState::Loading);
    let state = query.resolved().await;
    assert_eq!(state.user().map(|u| u.id.as_str()), Some("u-1"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gate_driven_by_query_redirects_once_then_allows_after_login() {
    let source = ScriptedSource::new(vec![Ok(None), Ok(Some(CurrentUser::new("u-1", "admin")))]);
    let cache = cache();
    let nav = CountingNavigator::default();
    let mut gate = AuthGate::new(RouteGuardSpec::admin(), &nav);
    let mut query = CurrentUserQuery::mount(&cache, source.clone());

    assert_eq!(gate.update(&query.auth_state()), GateDecision::Checking);
    assert_eq!(gate.update(&query.resolved().await), GateDecision::Redirecting);
    assert_eq!(gate.update(&query.auth_state()), GateDecision::Redirecting);
    assert_eq!(nav.calls.load(Ordering::SeqCst), 1);

    query.invalidate();
    assert_eq!(gate.update(&query.resolved().await), GateDecision::Allowed);
    assert_eq!(nav.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_lookup_redirects_and_exposes_error() {
    let source = ScriptedSource::new(vec![Err(ApiError::Status { status: 502, path: "/api/auth/me".into() })]);
    let cache = cache();
    let mut query = CurrentUserQuery::mount(&cache, source);

    assert_eq!(query.resolved().await, AuthQueryState::Resolved(None));
    assert!(matches!(query.error(), Some(ApiError::Status { status: 502, .. })));
}

#[tokio::test]
async fn changed_reports_next_state() {
    let source = ScriptedSource::new(vec![Ok(Some(CurrentUser::new("u-2", "user")))]);
    let cache = cache();
    let mut query = CurrentUserQuery::mount(&cache, source);

    let mut state = query.changed().await;
    while state == AuthQueryState::Loading {
        state = query.changed().await;
    }
    assert_eq!(state.user().map(|u| u.role.as_str()), Some("user"));
}

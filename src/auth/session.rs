//! Current-user query feeding the route gates.

use std::sync::Arc;

use crate::net::api::CurrentUserSource;
use crate::net::types::{ApiError, CurrentUser};
use crate::query::{QueryCache, QueryFn, QueryKey, QueryObserver, QueryState};
use crate::query_key;

use super::gate::AuthQueryState;

pub const CURRENT_USER_KEY: &str = "currentUser";

/// Cache type holding the identity lookup.
pub type CurrentUserCache = QueryCache<Option<CurrentUser>>;

struct CurrentUserFn(Arc<dyn CurrentUserSource>);

#[async_trait::async_trait]
impl QueryFn<Option<CurrentUser>> for CurrentUserFn {
    async fn fetch(&self) -> Result<Option<CurrentUser>, ApiError> {
        self.0.current_user().await
    }
}

#[must_use]
pub fn current_user_key() -> QueryKey {
    query_key![CURRENT_USER_KEY]
}

/// Map raw query state onto what a gate consumes.
///
/// A known user is kept through background refetches and transient
/// failures. With no user yet, a failed lookup counts as signed out.
#[must_use]
pub fn auth_state_from(state: &QueryState<Option<CurrentUser>>) -> AuthQueryState {
    if let Some(user) = &state.data {
        return AuthQueryState::Resolved(user.clone());
    }
    let settled_with_error = state.error.is_some() && !state.is_fetching && !state.is_loading;
    if settled_with_error { AuthQueryState::Resolved(None) } else { AuthQueryState::Loading }
}

/// A mounted observer of the current user.
pub struct CurrentUserQuery {
    observer: QueryObserver<Option<CurrentUser>>,
}

impl CurrentUserQuery {
    /// Mount on `cache`; the lookup starts immediately.
    #[must_use]
    pub fn mount(cache: &CurrentUserCache, source: Arc<dyn CurrentUserSource>) -> Self {
        let observer = cache.observe(current_user_key(), Arc::new(CurrentUserFn(source)));
        Self { observer }
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthQueryState {
        auth_state_from(&self.observer.state())
    }

    #[must_use]
    pub fn error(&self) -> Option<ApiError> {
        self.observer.error()
    }

    /// Wait for the next identity change.
    pub async fn changed(&mut self) -> AuthQueryState {
        auth_state_from(&self.observer.changed().await)
    }

    /// Wait until the lookup in flight, if any, has finished.
    pub async fn resolved(&mut self) -> AuthQueryState {
        auth_state_from(&self.observer.settled().await)
    }

    /// Re-run the lookup after a login or logout.
    pub fn invalidate(&self) {
        self.observer.refetch();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

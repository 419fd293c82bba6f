//! Route guard deciding whether protected content may render.
//!
//! DESIGN
//! ======
//! `evaluate` is the whole policy and is pure: loading, then authenticated,
//! then authorized, always in that order. An unauthenticated visitor to an
//! admin-only route is redirected, never told "denied", so the existence of
//! the resource does not leak.
//!
//! `AuthGate` wraps the policy with the single side effect it has: one
//! navigation to the login path per unauthenticated episode. Every gate
//! instance owns its own flag, so nested gates never interfere.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::DEFAULT_LOGIN_PATH;
use crate::net::types::CurrentUser;

pub const ADMIN_ROLE: &str = "admin";

/// Result of the "who is the current user" query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthQueryState {
    Loading,
    /// `None` means nobody is signed in.
    Resolved(Option<CurrentUser>),
}

impl AuthQueryState {
    #[must_use]
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            Self::Resolved(user) => user.as_ref(),
            Self::Loading => None,
        }
    }
}

/// Per-route access requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuardSpec {
    pub required_role: Option<String>,
}

impl RouteGuardSpec {
    /// Any signed-in user.
    #[must_use]
    pub fn authenticated() -> Self {
        Self { required_role: None }
    }

    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self { required_role: Some(role.into()) }
    }

    #[must_use]
    pub fn admin() -> Self {
        Self::role(ADMIN_ROLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Identity still loading: show a neutral placeholder.
    Checking,
    /// No identity: navigate to login, render nothing protected.
    Redirecting,
    /// Identity present but role mismatch: show permission denied in place.
    Denied,
    Allowed,
}

/// Decide what a guarded route shows for `state`.
#[must_use]
pub fn evaluate(state: &AuthQueryState, spec: &RouteGuardSpec) -> GateDecision {
    let AuthQueryState::Resolved(user) = state else {
        return GateDecision::Checking;
    };
    let Some(user) = user else {
        return GateDecision::Redirecting;
    };
    match &spec.required_role {
        Some(required) if *required != user.role => GateDecision::Denied,
        _ => GateDecision::Allowed,
    }
}

/// Navigation collaborator: "go to this path".
pub trait Navigator {
    fn navigate(&self, path: &str);
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn navigate(&self, path: &str) {
        (**self).navigate(path);
    }
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn navigate(&self, path: &str) {
        (**self).navigate(path);
    }
}

/// What a guarded route renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<V> {
    Loading,
    Redirecting,
    Denied,
    Content(V),
}

impl<V> Guarded<V> {
    #[must_use]
    pub fn decision(&self) -> GateDecision {
        match self {
            Self::Loading => GateDecision::Checking,
            Self::Redirecting => GateDecision::Redirecting,
            Self::Denied => GateDecision::Denied,
            Self::Content(_) => GateDecision::Allowed,
        }
    }

    pub fn content(self) -> Option<V> {
        match self {
            Self::Content(v) => Some(v),
            _ => None,
        }
    }
}

/// A mounted route guard.
pub struct AuthGate<N> {
    spec: RouteGuardSpec,
    navigator: N,
    login_path: String,
    redirect_issued: bool,
    decision: GateDecision,
}

impl<N: Navigator> AuthGate<N> {
    #[must_use]
    pub fn new(spec: RouteGuardSpec, navigator: N) -> Self {
        Self {
            spec,
            navigator,
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            redirect_issued: false,
            decision: GateDecision::Checking,
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Decision from the most recent [`AuthGate::update`].
    #[must_use]
    pub fn decision(&self) -> GateDecision {
        self.decision
    }

    /// Re-evaluate against the latest identity state.
    ///
    /// Navigates to the login path the first time the state resolves with no
    /// user. Further evaluations stay quiet until a user resolves again.
    pub fn update(&mut self, state: &AuthQueryState) -> GateDecision {
        let decision = evaluate(state, &self.spec);
        match decision {
            GateDecision::Redirecting if !self.redirect_issued => {
                info!(path = %self.login_path, "not signed in; redirecting");
                self.navigator.navigate(&self.login_path);
                self.redirect_issued = true;
            }
            GateDecision::Denied if self.decision != GateDecision::Denied => {
                debug!(required_role = ?self.spec.required_role, "role mismatch; access denied");
                self.redirect_issued = false;
            }
            GateDecision::Allowed | GateDecision::Denied => self.redirect_issued = false,
            GateDecision::Checking | GateDecision::Redirecting => {}
        }
        self.decision = decision;
        decision
    }

    /// Evaluate `state` and build the guarded content only when allowed.
    pub fn render<V>(&mut self, state: &AuthQueryState, children: impl FnOnce() -> V) -> Guarded<V> {
        match self.update(state) {
            GateDecision::Checking => Guarded::Loading,
            GateDecision::Redirecting => Guarded::Redirecting,
            GateDecision::Denied => Guarded::Denied,
            GateDecision::Allowed => Guarded::Content(children()),
        }
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

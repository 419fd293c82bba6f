//! Client-side access control.
//!
//! `gate` holds the render policy for protected routes; `session` turns the
//! current-user query into the `AuthQueryState` the gate consumes.

pub mod gate;
pub mod session;

pub use gate::{ADMIN_ROLE, AuthGate, AuthQueryState, GateDecision, Guarded, Navigator, RouteGuardSpec, evaluate};
pub use session::{CurrentUserCache, CurrentUserQuery};

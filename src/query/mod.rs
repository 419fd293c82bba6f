//! Query capability: keyed async fetches with a shared client-side cache.
//!
//! DESIGN
//! ======
//! Entries are stale as soon as they land (`stale_time = 0` by default), so
//! freshness comes entirely from revalidation triggers: observer mount,
//! window focus via [`FocusManager`], explicit refetch and invalidation.
//! The remote store stays authoritative; nothing here writes optimistically.

pub mod cache;
pub mod focus;
pub mod key;
pub mod state;

pub use cache::{QueryCache, QueryFn, QueryObserver};
pub use focus::{FocusManager, Revalidate};
pub use key::{KeyPart, QueryKey};
pub use state::{FetchTrigger, QueryOptions, QueryState};

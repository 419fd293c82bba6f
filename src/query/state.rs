//! Per-key query state and freshness options.

use std::time::{Duration, Instant};

use crate::net::types::ApiError;

/// What caused a fetch to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTrigger {
    /// First observer mounted, or a remount of a stale entry.
    Mount,
    /// Window regained focus.
    Focus,
    /// Explicit `refetch()` by an observer.
    Refetch,
    /// A write elsewhere invalidated the entry.
    Invalidate,
}

/// Snapshot of one cached query as seen by its observers.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Last successfully fetched value. Kept across later failures.
    pub data: Option<T>,
    /// Error of the most recent completed fetch, cleared on success.
    pub error: Option<ApiError>,
    /// Fetching with no data yet.
    pub is_loading: bool,
    /// Any fetch in flight, including background revalidation.
    pub is_fetching: bool,
    pub last_trigger: Option<FetchTrigger>,
    pub updated_at: Option<Instant>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self { data: None, error: None, is_loading: false, is_fetching: false, last_trigger: None, updated_at: None }
    }
}

impl<T> QueryState<T> {
    /// Stale when never fetched or older than `stale_time`. A zero
    /// `stale_time` makes every entry stale as soon as it lands.
    #[must_use]
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.updated_at.is_none_or(|at| at.elapsed() >= stale_time)
    }
}

/// Freshness and retry knobs for a [`super::QueryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
    pub refetch_on_focus: bool,
    pub refetch_on_mount: bool,
    /// How long an entry with no mounted observers is kept before eviction.
    pub gc_time: Duration,
    /// Extra attempts after the first failure, retryable errors only.
    pub retry: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            refetch_on_focus: true,
            refetch_on_mount: true,
            gc_time: Duration::from_secs(300),
            retry: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

impl QueryOptions {
    /// Backoff before retry number `attempt` (zero-based): base doubled per
    /// attempt, capped at `retry_max_delay`.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.retry_max_delay)
    }
}

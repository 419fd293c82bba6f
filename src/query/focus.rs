//! Window focus tracking and focus-driven revalidation.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use super::state::FetchTrigger;

/// Something holding mounted queries that can be told to refetch them.
pub trait Revalidate: Send + Sync {
    /// Start one fetch per mounted key. Returns how many fetches started.
    fn revalidate_mounted(self: Arc<Self>, trigger: FetchTrigger) -> usize;
}

/// Fan-out point for window focus events.
///
/// Caches register a weak handle on construction; dropped caches are pruned
/// on the next event.
#[derive(Clone)]
pub struct FocusManager {
    inner: Arc<Mutex<FocusInner>>,
}

struct FocusInner {
    focused: bool,
    listeners: Vec<Weak<dyn Revalidate>>,
}

impl Default for FocusManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusManager {
    /// A manager that starts in the focused state.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(FocusInner { focused: true, listeners: Vec::new() })) }
    }

    pub fn register(&self, listener: Weak<dyn Revalidate>) {
        self.lock().listeners.push(listener);
    }

    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.lock().focused
    }

    /// The window fired a focus event. Every registered cache refetches its
    /// mounted keys once.
    pub fn focus(&self) -> usize {
        self.lock().focused = true;
        self.revalidate_all()
    }

    pub fn blur(&self) {
        self.lock().focused = false;
    }

    /// Record visibility; only an unfocused to focused transition refetches.
    pub fn set_focused(&self, focused: bool) -> usize {
        let was_focused = std::mem::replace(&mut self.lock().focused, focused);
        if focused && !was_focused { self.revalidate_all() } else { 0 }
    }

    fn revalidate_all(&self) -> usize {
        let listeners: Vec<Arc<dyn Revalidate>> = {
            let mut inner = self.lock();
            inner.listeners.retain(|l| l.strong_count() > 0);
            inner.listeners.iter().filter_map(Weak::upgrade).collect()
        };
        let started: usize = listeners
            .into_iter()
            .map(|l| l.revalidate_mounted(FetchTrigger::Focus))
            .sum();
        debug!(started, "focus revalidation");
        started
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FocusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Freshness cache: memoize a fetch function's last successful result for a
//! fixed validity window.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CacheConfig;

/// Result-pair returned by a fetch function.
///
/// Unlike `Result`, this can express "no data and no error", which the
/// cache passes through without storing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse<T, E> {
    pub data: Option<T>,
    pub error: Option<E>,
}

impl<T, E> FetchResponse<T, E> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: E) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }
}

impl<T, E> From<Result<T, E>> for FetchResponse<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(error),
        }
    }
}

/// A value and the instant it was captured.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub captured_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, validity_window: Duration) -> bool {
        self.captured_at.elapsed() < validity_window
    }
}

/// Time-windowed memoization of a single fetched value.
///
/// Clones share the same slot. The entry is replaced whole under a mutex,
/// so readers see either the old entry or the new one.
///
/// There is no single-flight de-duplication: concurrent `read` calls that
/// all find the entry stale each invoke their fetch function. Callers that
/// need at most one refresh in flight must serialize reads themselves.
#[derive(Debug)]
pub struct FreshnessCache<T> {
    slot: Arc<Mutex<Option<CacheEntry<T>>>>,
    validity_window: Duration,
}

impl<T> Clone for FreshnessCache<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            validity_window: self.validity_window,
        }
    }
}

impl<T: Clone> FreshnessCache<T> {
    pub fn new(validity_window: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            validity_window,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.validity_window())
    }

    pub fn validity_window(&self) -> Duration {
        self.validity_window
    }

    /// The cached value, if it was captured less than the validity window
    /// ago. Never calls a fetch function.
    pub fn peek(&self) -> Option<T> {
        self.lock()
            .as_ref()
            .filter(|entry| entry.is_fresh(self.validity_window))
            .map(|entry| entry.value.clone())
    }

    pub fn is_fresh(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|entry| entry.is_fresh(self.validity_window))
    }

    /// Return the cached value while fresh, otherwise refresh through
    /// `fetch`.
    ///
    /// A fetch error is returned unchanged and leaves any existing entry in
    /// place without extending its freshness. A response with neither data
    /// nor error yields `Ok(None)` and stores nothing.
    pub async fn read<F, Fut, E>(&self, fetch: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResponse<T, E>>,
    {
        if let Some(value) = self.peek() {
            tracing::debug!("Freshness cache hit");
            return Ok(Some(value));
        }

        tracing::debug!("Freshness cache miss, fetching");
        self.refresh(fetch).await
    }

    /// Call `fetch` regardless of freshness and store a successful result.
    ///
    /// Failure handling is the same as [`FreshnessCache::read`]: the error
    /// is returned and the existing entry, fresh or not, is kept.
    pub async fn refresh<F, Fut, E>(&self, fetch: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResponse<T, E>>,
    {
        let response = fetch().await;

        if let Some(error) = response.error {
            tracing::debug!("Refresh failed, keeping existing entry");
            return Err(error);
        }
        let Some(value) = response.data else {
            return Ok(None);
        };

        *self.lock() = Some(CacheEntry {
            value: value.clone(),
            captured_at: Instant::now(),
        });
        Ok(Some(value))
    }

    /// Drop the stored entry. The next `read` always fetches.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<CacheEntry<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

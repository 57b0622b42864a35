use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::freshness::{Freshness, FreshnessPolicy};
use crate::key::CacheKey;
use crate::loader::{Acquire, InFlightRegistry, LoadFuture, LoadResult};
use crate::metrics::{bump, Metrics};
use crate::store::EntryStore;
use crate::subscriber::SubscriberRegistry;
use crate::TaskSpawner;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

/// Why a fetch was started. Only foreground fetches have a caller that is
/// guaranteed to observe the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadOrigin {
  /// A read that had no usable value (or was forced) and waits for the fetch.
  Foreground,
  /// A stale read, or a background-only read, refreshing the entry.
  Revalidate,
  /// A `prefetch` warming the cache ahead of a read.
  Prefetch,
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<V> {
  pub(crate) store: EntryStore<V>,
  pub(crate) in_flight: InFlightRegistry<V>,
  pub(crate) subscribers: Arc<SubscriberRegistry<V>>,
  pub(crate) policy: FreshnessPolicy,
  pub(crate) metrics: Metrics,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
}

impl<V> fmt::Debug for CacheShared<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("store", &self.store)
      .field("in_flight", &self.in_flight.len())
      .field("policy", &self.policy)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<V> CacheShared<V> {
  pub(crate) fn classify(&self, entry: Option<&CacheEntry<V>>, ttl: Duration) -> Freshness {
    self
      .policy
      .classify(entry.map(CacheEntry::written_at), self.store.now(), ttl)
  }

  /// The stored value for `key` if it is fresh for `ttl`.
  pub(crate) fn fresh_value(&self, key: &str, ttl: Duration) -> Option<Arc<V>> {
    let entry = self.store.read(key)?;
    match self.classify(Some(&entry), ttl) {
      Freshness::Fresh => Some(entry.value()),
      Freshness::Stale | Freshness::Absent => None,
    }
  }

  /// Writes `value` under `key` and tells the key's subscribers.
  pub(crate) fn commit(&self, key: &CacheKey, value: Arc<V>) {
    self.store.write(key.clone(), Arc::clone(&value));
    self.notify(key, &value);
  }

  pub(crate) fn notify(&self, key: &CacheKey, value: &Arc<V>) {
    let report = self.subscribers.notify(key, value);
    self
      .metrics
      .notifications
      .fetch_add(report.delivered, Ordering::Relaxed);
    self
      .metrics
      .subscriber_panics
      .fetch_add(report.panicked, Ordering::Relaxed);
  }
}

impl<V> CacheShared<V>
where
  V: Send + Sync + 'static,
{
  /// Starts a detached fetch for `key` unless one is already running.
  ///
  /// Returns `true` if this call started the fetch.
  pub(crate) fn start_detached<F, Fut, E>(self: &Arc<Self>, key: &CacheKey, fetcher: F, origin: LoadOrigin) -> bool
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    match self.in_flight.acquire(key, || None) {
      Acquire::Leader(handle) => {
        if origin == LoadOrigin::Revalidate {
          bump(&self.metrics.background_refreshes);
        }
        Self::spawn_load_task(Arc::clone(self), key.clone(), handle, fetcher, origin);
        true
      }
      Acquire::Joined(_) | Acquire::Cached(_) => {
        trace!(key = %key, ?origin, "fetch already in flight");
        false
      }
    }
  }

  /// Runs `fetcher` on the spawner and settles `handle` with its outcome.
  ///
  /// The caller must have registered `handle` as the leader for `key`.
  pub(crate) fn spawn_load_task<F, Fut, E>(
    shared: Arc<Self>,
    key: CacheKey,
    handle: Arc<LoadFuture<V>>,
    fetcher: F,
    origin: LoadOrigin,
  ) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    bump(&shared.metrics.fetches_started);
    debug!(key = %key, ?origin, "starting fetch");

    let spawner = Arc::clone(&shared.spawner);
    // Built outside the task so that a spawner which drops the task unpolled
    // still settles the handle.
    let guard = SettleGuard {
      shared,
      key,
      handle,
      settled: false,
    };
    let task = async move {
      let outcome = fetcher().await;
      let key = guard.key.clone();
      let result = guard.settle(outcome);

      match origin {
        LoadOrigin::Foreground => {}
        LoadOrigin::Revalidate | LoadOrigin::Prefetch => best_effort(&key, origin, result),
      }
    };
    spawner.spawn(Box::pin(task));
  }
}

/// Consumes the result of a fetch nobody is obliged to wait for.
///
/// A failed refresh leaves the previously cached value in place; the next
/// stale or absent read tries again.
fn best_effort<V>(key: &CacheKey, origin: LoadOrigin, result: LoadResult<V>) {
  if let Err(error) = result {
    debug!(key = %key, ?origin, %error, "detached fetch failed; keeping cached value");
  }
}

/// Settles a load exactly once, even if the fetch task is dropped or panics
/// before producing a result.
struct SettleGuard<V> {
  shared: Arc<CacheShared<V>>,
  key: CacheKey,
  handle: Arc<LoadFuture<V>>,
  settled: bool,
}

impl<V> SettleGuard<V> {
  fn settle<E>(mut self, outcome: Result<V, E>) -> LoadResult<V>
  where
    E: StdError + Send + Sync + 'static,
  {
    let shared = &self.shared;
    let result = match outcome {
      Ok(value) => {
        let value = Arc::new(value);
        shared.store.write(self.key.clone(), Arc::clone(&value));
        bump(&shared.metrics.fetch_successes);
        debug!(key = %self.key, "fetch succeeded");
        Ok(value)
      }
      Err(error) => {
        bump(&shared.metrics.fetch_failures);
        Err(CacheError::fetch(self.key.clone(), error))
      }
    };

    // The handle must be gone before any waiter wakes up, so that a read
    // issued right after settlement starts a new fetch.
    shared.in_flight.remove(&self.key, &self.handle);
    self.handle.settle(result.clone());
    if let Ok(value) = &result {
      shared.notify(&self.key, value);
    }

    self.settled = true;
    result
  }
}

impl<V> Drop for SettleGuard<V> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    bump(&self.shared.metrics.fetches_abandoned);
    warn!(key = %self.key, "fetch task dropped before completing");
    self.shared.in_flight.remove(&self.key, &self.handle);
    self
      .handle
      .settle(Err(CacheError::Abandoned(self.key.clone())));
  }
}

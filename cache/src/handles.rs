use crate::builder::CacheBuilder;
use crate::error::Result;
use crate::freshness::Freshness;
use crate::key::CacheKey;
use crate::loader::Acquire;
use crate::metrics::bump;
use crate::shared::{CacheShared, LoadOrigin};
use crate::subscriber::Subscription;
use crate::MetricsSnapshot;

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

/// Per-call switches for [`DataCache::read_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
  /// Skip freshness classification and always wait for a fetch. The fetch is
  /// still deduplicated: if one is already running, the read attaches to it.
  pub force_refresh: bool,
}

impl ReadOptions {
  pub fn force_refresh() -> Self {
    Self {
      force_refresh: true,
    }
  }
}

/// A stale-while-revalidate data cache with single-flight fetches.
///
/// `DataCache` is a cheap handle; clones share the same tables. For any key,
/// a read either serves a fresh value, serves a stale value while one
/// background refresh runs, or waits for a fetch. However many callers ask
/// for the same key at once, only one fetch for it is ever in flight.
///
/// ```no_run
/// # use std::time::Duration;
/// # use tutor_cache::{DataCache, TtlTier};
/// # async fn demo() -> tutor_cache::Result<()> {
/// let cache: DataCache<Vec<String>> = DataCache::builder().build().expect("runtime available");
///
/// let lessons = cache
///   .read("teacher:lessons", TtlTier::Medium.duration(), || async {
///     Ok::<_, std::io::Error>(vec!["Algebra".to_string()])
///   })
///   .await?;
/// assert_eq!(lessons[0], "Algebra");
/// # Ok(())
/// # }
/// ```
pub struct DataCache<V> {
  pub(crate) shared: Arc<CacheShared<V>>,
}

impl<V> Clone for DataCache<V> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<V> fmt::Debug for DataCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DataCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<V> DataCache<V> {
  pub fn builder() -> CacheBuilder<V> {
    CacheBuilder::new()
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Returns the stored value without any freshness check and without
  /// fetching. Meant for synchronous first paint.
  pub fn peek(&self, key: impl AsRef<str>) -> Option<Arc<V>> {
    self
      .shared
      .store
      .read(key.as_ref())
      .map(|entry| entry.value())
  }

  /// Classifies the stored entry for `key` as of now.
  pub fn freshness(&self, key: impl AsRef<str>, ttl: Duration) -> Freshness {
    let entry = self.shared.store.read(key.as_ref());
    self.shared.classify(entry.as_deref(), ttl)
  }

  /// Returns `true` only if the stored entry is younger than `ttl`.
  pub fn is_fresh(&self, key: impl AsRef<str>, ttl: Duration) -> bool {
    self.freshness(key, ttl) == Freshness::Fresh
  }

  /// Writes `value` directly, without fetching, and notifies subscribers.
  ///
  /// Use after a mutation when the caller already knows the new value.
  /// A fetch for the same key that is still running will overwrite this
  /// value when it completes.
  pub fn set(&self, key: impl Into<CacheKey>, value: V) -> Arc<V> {
    let key = key.into();
    let value = Arc::new(value);
    bump(&self.shared.metrics.optimistic_writes);
    self.shared.commit(&key, Arc::clone(&value));
    value
  }

  /// Removes `prefix` itself and every key namespaced under `prefix:`.
  ///
  /// `invalidate("teacher")` removes `"teacher"`, `"teacher:stats"` and
  /// `"teacher:lessons:42"`, but not `"teacher-other"`. Running fetches are
  /// not cancelled; they write their results when they complete.
  /// Returns the number of entries removed.
  pub fn invalidate(&self, prefix: impl AsRef<str>) -> usize {
    let prefix = prefix.as_ref();
    let removed = self.shared.store.remove_by_prefix(prefix);
    self
      .shared
      .metrics
      .invalidations
      .fetch_add(removed as u64, Ordering::Relaxed);
    trace!(prefix, removed, "invalidated");
    removed
  }

  /// Removes exactly `key`, leaving keys namespaced under it alone.
  pub fn invalidate_exact(&self, key: impl AsRef<str>) -> bool {
    let removed = self.shared.store.remove(key.as_ref());
    if removed {
      bump(&self.shared.metrics.invalidations);
    }
    removed
  }

  /// Removes every entry. Returns the number of entries removed.
  pub fn clear(&self) -> usize {
    let removed = self.shared.store.clear();
    self
      .shared
      .metrics
      .invalidations
      .fetch_add(removed as u64, Ordering::Relaxed);
    removed
  }

  /// Registers `callback` to run every time `key` is written, whether by a
  /// fetch, a background refresh or [`set`](DataCache::set).
  ///
  /// A panicking callback does not affect the write or other callbacks.
  pub fn subscribe<F>(&self, key: impl Into<CacheKey>, callback: F) -> Subscription<V>
  where
    F: Fn(&CacheKey, &Arc<V>) + Send + Sync + 'static,
  {
    let key = key.into();
    let id = self
      .shared
      .subscribers
      .subscribe(key.clone(), Arc::new(callback));
    Subscription::new(key, id, &self.shared.subscribers)
  }

  pub fn subscriber_count(&self, key: impl AsRef<str>) -> usize {
    self.shared.subscribers.count(key.as_ref())
  }

  /// Returns `true` while a fetch for `key` is running.
  pub fn is_loading(&self, key: impl AsRef<str>) -> bool {
    self.shared.in_flight.contains(key.as_ref())
  }

  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stale_multiplier(&self) -> u32 {
    self.shared.policy.stale_multiplier()
  }
}

impl<V> DataCache<V>
where
  V: Send + Sync + 'static,
{
  /// Read-through get.
  ///
  /// - **Fresh**: returns the stored value.
  /// - **Stale**: returns the stored value and starts one background refresh
  ///   with `fetcher`, unless a fetch is already running.
  /// - **Absent**: waits for a fetch, starting one with `fetcher` only if
  ///   none is running.
  ///
  /// `fetcher` is dropped without being called whenever it is not needed.
  pub async fn read<K, F, Fut, E>(&self, key: K, ttl: Duration, fetcher: F) -> Result<Arc<V>>
  where
    K: Into<CacheKey>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    self.read_with(key, ttl, ReadOptions::default(), fetcher).await
  }

  /// [`read`](DataCache::read) with options.
  pub async fn read_with<K, F, Fut, E>(
    &self,
    key: K,
    ttl: Duration,
    options: ReadOptions,
    fetcher: F,
  ) -> Result<Arc<V>>
  where
    K: Into<CacheKey>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    let key = key.into();
    let shared = &self.shared;

    if !options.force_refresh {
      if let Some(entry) = shared.store.read(key.as_str()) {
        match shared.classify(Some(&entry), ttl) {
          Freshness::Fresh => {
            bump(&shared.metrics.fresh_hits);
            trace!(key = %key, "fresh hit");
            return Ok(entry.value());
          }
          Freshness::Stale => {
            bump(&shared.metrics.stale_hits);
            trace!(key = %key, "stale hit");
            shared.start_detached(&key, fetcher, LoadOrigin::Revalidate);
            return Ok(entry.value());
          }
          Freshness::Absent => {}
        }
      }
    }

    bump(&shared.metrics.misses);

    let force_refresh = options.force_refresh;
    let acquired = shared.in_flight.acquire(&key, || {
      if force_refresh {
        None
      } else {
        shared.fresh_value(key.as_str(), ttl)
      }
    });

    let handle = match acquired {
      Acquire::Cached(value) => return Ok(value),
      Acquire::Joined(handle) => {
        bump(&shared.metrics.fetches_joined);
        trace!(key = %key, "joined running fetch");
        handle
      }
      Acquire::Leader(handle) => {
        CacheShared::spawn_load_task(
          Arc::clone(shared),
          key,
          Arc::clone(&handle),
          fetcher,
          LoadOrigin::Foreground,
        );
        handle
      }
    };

    (&*handle).await
  }

  /// Background-only read: returns whatever is stored for `key` (possibly
  /// nothing) without waiting, and starts a refresh if the entry is not
  /// fresh for `ttl` and no fetch is running.
  pub fn read_background<K, F, Fut, E>(&self, key: K, ttl: Duration, fetcher: F) -> Option<Arc<V>>
  where
    K: Into<CacheKey>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    let key = key.into();
    let entry = self.shared.store.read(key.as_str());
    if self.shared.classify(entry.as_deref(), ttl) != Freshness::Fresh {
      self
        .shared
        .start_detached(&key, fetcher, LoadOrigin::Revalidate);
    }
    entry.map(|entry| entry.value())
  }

  /// Warms the cache for `key` ahead of an anticipated read.
  ///
  /// Fire-and-forget: the result is written to the cache and errors are
  /// discarded. Does nothing if a fetch for `key` is already running.
  pub fn prefetch<K, F, Fut, E>(&self, key: K, fetcher: F)
  where
    K: Into<CacheKey>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
  {
    let key = key.into();
    self.shared.start_detached(&key, fetcher, LoadOrigin::Prefetch);
  }
}

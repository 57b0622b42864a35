//! Request deduplication.
//!
//! Every fetch the cache starts is represented by one `LoadFuture`, registered
//! under its key in the `InFlightRegistry` for as long as the fetch runs.
//! Callers that want the same key while the fetch is running attach to the
//! existing `LoadFuture` instead of starting another one.

use crate::error::CacheError;
use crate::key::CacheKey;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;

/// What every caller attached to a load eventually receives.
pub(crate) type LoadResult<V> = Result<Arc<V>, CacheError>;

/// The internal state of a value being loaded.
enum State<V> {
  Loading,
  Settled(LoadResult<V>),
}

/// The internal, mutex-protected core of the LoadFuture.
struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waker>,
}

/// A future that represents a value being fetched for the cache.
/// It can be awaited by any number of tasks simultaneously.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Loading" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Loading,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Settles the future, waking all waiters. Only the first call has any
  /// effect.
  pub(crate) fn settle(&self, result: LoadResult<V>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if matches!(inner.state, State::Settled(_)) {
        return;
      }
      inner.state = State::Settled(result);
      std::mem::take(&mut inner.waiters)
    };
    for waker in waiters {
      waker.wake();
    }
  }

  #[cfg(test)]
  pub(crate) fn is_settled(&self) -> bool {
    matches!(self.inner.lock().state, State::Settled(_))
  }
}

impl<V> Future for &LoadFuture<V> {
  type Output = LoadResult<V>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Settled(result) => Poll::Ready(result.clone()),
      State::Loading => {
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
          inner.waiters.push_back(cx.waker().clone());
        }
        Poll::Pending
      }
    }
  }
}

/// The outcome of asking the registry for a key.
pub(crate) enum Acquire<V> {
  /// The re-check against the entry store found a usable value.
  Cached(Arc<V>),
  /// A fetch for the key was already running. Await it; do not fetch.
  Joined(Arc<LoadFuture<V>>),
  /// No fetch was running. The caller owns the new handle and must start
  /// the fetch and eventually settle it.
  Leader(Arc<LoadFuture<V>>),
}

/// The key-indexed table of running fetches.
///
/// At most one `LoadFuture` exists per key at any instant.
pub(crate) struct InFlightRegistry<V> {
  loads: Mutex<HashMap<CacheKey, Arc<LoadFuture<V>>>>,
}

impl<V> InFlightRegistry<V> {
  pub(crate) fn new() -> Self {
    Self {
      loads: Mutex::new(HashMap::new()),
    }
  }

  /// Joins the running fetch for `key` or registers a new one.
  ///
  /// `recheck` runs while the registry is locked, before any handle is
  /// looked at. It lets the read path catch a value written by a fetch that
  /// settled between the caller's first look at the store and this call.
  pub(crate) fn acquire<R>(&self, key: &CacheKey, recheck: R) -> Acquire<V>
  where
    R: FnOnce() -> Option<Arc<V>>,
  {
    let mut loads = self.loads.lock();

    if let Some(value) = recheck() {
      return Acquire::Cached(value);
    }

    if let Some(existing) = loads.get(key) {
      return Acquire::Joined(Arc::clone(existing));
    }

    let handle = Arc::new(LoadFuture::new());
    loads.insert(key.clone(), Arc::clone(&handle));
    Acquire::Leader(handle)
  }

  /// Unregisters `handle`. A handle registered later for the same key is
  /// left alone.
  pub(crate) fn remove(&self, key: &CacheKey, handle: &Arc<LoadFuture<V>>) -> bool {
    let mut loads = self.loads.lock();
    match loads.get(key) {
      Some(current) if Arc::ptr_eq(current, handle) => {
        loads.remove(key);
        true
      }
      _ => false,
    }
  }

  pub(crate) fn contains(&self, key: &str) -> bool {
    self.loads.lock().contains_key(key)
  }

  pub(crate) fn len(&self) -> usize {
    self.loads.lock().len()
  }
}

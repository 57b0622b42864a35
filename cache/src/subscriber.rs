use crate::key::CacheKey;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;

/// A callback invoked with the key and new value every time an entry is
/// written.
pub type UpdateCallback<V> = Arc<dyn Fn(&CacheKey, &Arc<V>) + Send + Sync>;

/// How a single `notify` went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct NotifyReport {
  pub(crate) delivered: u64,
  pub(crate) panicked: u64,
}

/// The key-indexed set of update callbacks.
pub(crate) struct SubscriberRegistry<V> {
  next_id: AtomicU64,
  subscribers: RwLock<HashMap<CacheKey, Vec<(u64, UpdateCallback<V>)>>>,
}

impl<V> SubscriberRegistry<V> {
  pub(crate) fn new() -> Self {
    Self {
      next_id: AtomicU64::new(1),
      subscribers: RwLock::new(HashMap::new()),
    }
  }

  pub(crate) fn subscribe(&self, key: CacheKey, callback: UpdateCallback<V>) -> u64 {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .subscribers
      .write()
      .entry(key)
      .or_default()
      .push((id, callback));
    id
  }

  pub(crate) fn unsubscribe(&self, key: &CacheKey, id: u64) -> bool {
    let mut subscribers = self.subscribers.write();
    let Some(callbacks) = subscribers.get_mut(key) else {
      return false;
    };
    let before = callbacks.len();
    callbacks.retain(|(existing, _)| *existing != id);
    let removed = callbacks.len() != before;
    if callbacks.is_empty() {
      subscribers.remove(key);
    }
    removed
  }

  /// Calls every callback registered for `key`.
  ///
  /// Callbacks run outside the registry lock, so they may subscribe or
  /// unsubscribe. A panicking callback is contained and reported; the
  /// remaining callbacks still run.
  pub(crate) fn notify(&self, key: &CacheKey, value: &Arc<V>) -> NotifyReport {
    let callbacks: Vec<UpdateCallback<V>> = match self.subscribers.read().get(key) {
      Some(callbacks) => callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
      None => return NotifyReport::default(),
    };

    let mut report = NotifyReport::default();
    for callback in callbacks {
      match panic::catch_unwind(AssertUnwindSafe(|| callback(key, value))) {
        Ok(()) => report.delivered += 1,
        Err(_) => {
          report.panicked += 1;
          tracing::warn!(key = %key, "cache subscriber panicked; continuing with remaining subscribers");
        }
      }
    }
    report
  }

  pub(crate) fn count(&self, key: &str) -> usize {
    self.subscribers.read().get(key).map_or(0, Vec::len)
  }
}

/// A registration made with [`DataCache::subscribe`](crate::DataCache::subscribe).
///
/// Membership is managed by the caller: dropping a `Subscription` does **not**
/// remove the callback. Call [`unsubscribe`](Subscription::unsubscribe) to
/// stop receiving updates.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription<V> {
  key: CacheKey,
  id: u64,
  registry: Weak<SubscriberRegistry<V>>,
}

impl<V> Subscription<V> {
  pub(crate) fn new(key: CacheKey, id: u64, registry: &Arc<SubscriberRegistry<V>>) -> Self {
    Self {
      key,
      id,
      registry: Arc::downgrade(registry),
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Removes the callback. Returns `false` if it was already gone or the
  /// cache no longer exists.
  pub fn unsubscribe(self) -> bool {
    match self.registry.upgrade() {
      Some(registry) => registry.unsubscribe(&self.key, self.id),
      None => false,
    }
  }
}

impl<V> fmt::Debug for Subscription<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("id", &self.id)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  fn counter_callback(counter: &Arc<AtomicUsize>) -> UpdateCallback<u32> {
    let counter = Arc::clone(counter);
    Arc::new(move |_: &CacheKey, _: &Arc<u32>| {
      counter.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn notifies_only_the_written_key() {
    let registry = SubscriberRegistry::<u32>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    registry.subscribe("a".into(), counter_callback(&hits));

    registry.notify(&"b".into(), &Arc::new(1));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let report = registry.notify(&"a".into(), &Arc::new(1));
    assert_eq!(report.delivered, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn panicking_callback_is_isolated() {
    let registry = SubscriberRegistry::<u32>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    registry.subscribe("a".into(), Arc::new(|_: &CacheKey, _: &Arc<u32>| panic!("subscriber bug")));
    registry.subscribe("a".into(), counter_callback(&hits));

    let report = registry.notify(&"a".into(), &Arc::new(1));
    assert_eq!(report, NotifyReport { delivered: 1, panicked: 1 });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn unsubscribe_drops_empty_keys() {
    let registry = SubscriberRegistry::<u32>::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::from("a");
    let id = registry.subscribe(key.clone(), counter_callback(&hits));

    assert_eq!(registry.count("a"), 1);
    assert!(registry.unsubscribe(&key, id));
    assert!(!registry.unsubscribe(&key, id));
    assert_eq!(registry.count("a"), 0);
  }
}

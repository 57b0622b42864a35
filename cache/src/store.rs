use crate::entry::CacheEntry;
use crate::key::{self, CacheKey};
use crate::time::Clock;

use core::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

type Shard<V> = RwLock<HashMap<CacheKey, Arc<CacheEntry<V>>>>;

/// The key-indexed table of cached values.
///
/// The table is partitioned into multiple, independently locked shards so
/// that reads and writes on different keys rarely contend. Locks are only
/// ever held for a map operation and never across an `.await`.
pub(crate) struct EntryStore<V> {
  shards: Box<[CachePadded<Shard<V>>]>,
  hasher: ahash::RandomState,
  clock: Arc<dyn Clock>,
}

impl<V> fmt::Debug for EntryStore<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EntryStore")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len())
      .finish()
  }
}

impl<V> EntryStore<V> {
  /// Creates a store with `num_shards` shards. The count must be a power of two.
  pub(crate) fn new(num_shards: usize, clock: Arc<dyn Clock>) -> Self {
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(HashMap::new())))
      .collect::<Vec<_>>()
      .into_boxed_slice();

    Self {
      shards,
      hasher: ahash::RandomState::new(),
      clock,
    }
  }

  /// The current time according to the store's clock.
  #[inline]
  pub(crate) fn now(&self) -> Duration {
    self.clock.now()
  }

  #[inline]
  fn shard(&self, key: &str) -> &Shard<V> {
    let hash = self.hasher.hash_one(key);
    // `new` is only called with a power-of-two shard count.
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }

  pub(crate) fn read(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
    self.shard(key).read().get(key).cloned()
  }

  /// Replaces the entry for `key`, stamping it with the current time.
  pub(crate) fn write(&self, key: CacheKey, value: Arc<V>) -> Arc<CacheEntry<V>> {
    let entry = Arc::new(CacheEntry::new(value, self.now()));
    self
      .shard(key.as_str())
      .write()
      .insert(key, Arc::clone(&entry));
    entry
  }

  pub(crate) fn remove(&self, key: &str) -> bool {
    self.shard(key).write().remove(key).is_some()
  }

  /// Removes every key equal to `prefix` or namespaced under `prefix:`.
  /// Returns the number of entries removed.
  pub(crate) fn remove_by_prefix(&self, prefix: &str) -> usize {
    self
      .shards
      .iter()
      .map(|shard| {
        let mut guard = shard.write();
        let before = guard.len();
        guard.retain(|key, _| !key::is_within(key.as_str(), prefix));
        before - guard.len()
      })
      .sum()
  }

  /// Removes everything. Returns the number of entries removed.
  pub(crate) fn clear(&self) -> usize {
    self
      .shards
      .iter()
      .map(|shard| {
        let mut guard = shard.write();
        let removed = guard.len();
        guard.clear();
        removed
      })
      .sum()
  }

  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().len()).sum()
  }
}

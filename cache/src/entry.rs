use std::sync::Arc;
use std::time::Duration;

/// A container for a value in the cache, holding all necessary metadata.
///
/// Entries are immutable once created; a write replaces the whole entry.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// When the value was written, as a duration since the clock's origin.
  written_at: Duration,
}

impl<V> CacheEntry<V> {
  pub(crate) fn new(value: Arc<V>, written_at: Duration) -> Self {
    Self { value, written_at }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn written_at(&self) -> Duration {
    self.written_at
  }
}

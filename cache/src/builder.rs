use crate::error::BuildError;
use crate::freshness::{FreshnessPolicy, DEFAULT_STALE_MULTIPLIER};
use crate::handles::DataCache;
use crate::loader::InFlightRegistry;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::store::EntryStore;
use crate::subscriber::SubscriberRegistry;
use crate::time::{Clock, MonotonicClock};
use crate::TaskSpawner;

use core::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A builder for creating `DataCache` instances.
///
/// An application builds one cache at start-up and shares clones of the
/// handle; tests build a fresh cache each.
pub struct CacheBuilder<V> {
  pub(crate) shards: usize,
  pub(crate) stale_multiplier: u32,
  spawner: Option<Arc<dyn TaskSpawner>>,
  clock: Option<Arc<dyn Clock>>,
  _value_marker: PhantomData<fn() -> V>,
}

impl<V> fmt::Debug for CacheBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("stale_multiplier", &self.stale_multiplier)
      .field("has_spawner", &self.spawner.is_some())
      .field("has_clock", &self.clock.is_some())
      .finish()
  }
}

impl<V> CacheBuilder<V> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      stale_multiplier: DEFAULT_STALE_MULTIPLIER,
      spawner: None,
      clock: None,
      _value_marker: PhantomData,
    }
  }

  /// Sets the number of entry-store shards.
  pub fn shards(mut self, shards: usize) -> Self {
    // Ensure shards is at least 1 and a power of two for fast bitwise ANDing.
    self.shards = shards.max(1).next_power_of_two();
    self
  }

  /// Sets how many TTLs an entry stays servable for.
  ///
  /// An entry read with `ttl` is fresh for `ttl`, stale (served while a
  /// refresh runs) until `ttl * multiplier`, and unusable after that.
  /// Defaults to `3`.
  pub fn stale_multiplier(mut self, multiplier: u32) -> Self {
    self.stale_multiplier = multiplier;
    self
  }

  /// Sets the spawner that fetches run on.
  ///
  /// With the `tokio` feature enabled and no spawner set, the cache uses the
  /// Tokio runtime that is current when `build` is called.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the time source used to stamp and age entries.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = Some(clock);
    self
  }

  /// Applies a deserialized configuration on top of this builder.
  #[cfg(feature = "serde")]
  pub fn from_config(mut self, config: &crate::config::CacheConfig) -> Self {
    if let Some(shards) = config.shards {
      self = self.shards(shards);
    }
    self.stale_multiplier(config.stale_multiplier)
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.stale_multiplier == 0 {
      return Err(BuildError::InvalidStaleMultiplier);
    }
    Ok(())
  }

  fn resolve_spawner(&mut self) -> Result<Arc<dyn TaskSpawner>, BuildError> {
    if let Some(spawner) = self.spawner.take() {
      return Ok(spawner);
    }

    #[cfg(feature = "tokio")]
    {
      if let Some(spawner) = crate::runtime::TokioSpawner::try_current() {
        return Ok(Arc::new(spawner));
      }
    }

    Err(BuildError::SpawnerRequired)
  }
}

impl<V> Default for CacheBuilder<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> CacheBuilder<V>
where
  V: Send + Sync + 'static,
{
  /// Builds the cache.
  pub fn build(mut self) -> Result<DataCache<V>, BuildError> {
    self.validate()?;
    let spawner = self.resolve_spawner()?;
    let clock = self
      .clock
      .take()
      .unwrap_or_else(|| Arc::new(MonotonicClock) as Arc<dyn Clock>);

    tracing::debug!(
      shards = self.shards,
      stale_multiplier = self.stale_multiplier,
      "building data cache"
    );

    let shared = Arc::new(CacheShared {
      store: EntryStore::new(self.shards, clock),
      in_flight: InFlightRegistry::new(),
      subscribers: Arc::new(SubscriberRegistry::new()),
      policy: FreshnessPolicy::new(self.stale_multiplier),
      metrics: Metrics::new(),
      spawner,
    });

    Ok(DataCache { shared })
  }
}

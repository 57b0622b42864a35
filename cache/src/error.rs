use crate::key::CacheKey;

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// A fetch error shared between every caller attached to the same fetch.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors returned by read-through operations.
///
/// `CacheError` is `Clone`: one settled fetch fans out the same error to
/// every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  /// The fetch function returned an error. Nothing was written to the cache.
  #[error("fetch for `{key}` failed: {source}")]
  Fetch {
    key: CacheKey,
    #[source]
    source: SharedError,
  },

  /// The fetch task was dropped before it produced a result, most likely
  /// because the fetch function panicked or its runtime shut down.
  #[error("fetch for `{0}` ended without producing a result")]
  Abandoned(CacheKey),
}

impl CacheError {
  pub(crate) fn fetch<E>(key: CacheKey, error: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    CacheError::Fetch {
      key,
      source: Arc::new(error),
    }
  }

  /// The key whose fetch failed.
  pub fn key(&self) -> &CacheKey {
    match self {
      CacheError::Fetch { key, .. } | CacheError::Abandoned(key) => key,
    }
  }

  /// Attempts to view the fetch function's error as a concrete type.
  pub fn source_as<E: StdError + 'static>(&self) -> Option<&E> {
    match self {
      CacheError::Fetch { source, .. } => source.downcast_ref::<E>(),
      CacheError::Abandoned(_) => None,
    }
  }
}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The cache was configured with zero shards, which is not allowed.
  #[error("shard count cannot be zero")]
  ZeroShards,

  /// A staleness multiplier of zero would make every entry unusable.
  #[error("stale multiplier must be at least 1")]
  InvalidStaleMultiplier,

  /// No `TaskSpawner` was configured and no Tokio runtime is available to
  /// run fetches on.
  #[error("the cache requires a task spawner or a running Tokio runtime")]
  SpawnerRequired,
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

//! A stale-while-revalidate data cache for async clients.
//!
//! The cache sits between UI-facing call sites and a remote fetch function.
//! For each logical resource key it decides whether to serve memory, serve
//! memory and refresh in the background, or fetch and wait, and it
//! guarantees that concurrent callers for the same key never trigger more
//! than one fetch at a time.
//!
//! # Features
//! - **Single-flight fetches**: concurrent reads of a key share one fetch and
//!   its value or error.
//! - **Stale-while-revalidate**: stale entries are served immediately while a
//!   single background refresh runs.
//! - **Per-call TTLs**: freshness is decided by the TTL of each read, with a
//!   configurable staleness multiplier (3 by default).
//! - **Namespaced invalidation**: `invalidate("teacher")` removes
//!   `"teacher"` and everything under `"teacher:"`.
//! - **Subscriptions**: callbacks run on every write to a key.
//! - **Observability**: lock-free counters exposed as a [`MetricsSnapshot`].
//!
//! There is no persistence, no eviction and no retry policy. Entries live
//! until they are invalidated or the cache is dropped.

// Public modules that form the API
pub mod builder;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod freshness;
pub mod handles;
pub mod key;
pub mod metrics;
pub mod runtime;
pub mod subscriber;
pub mod time;
pub mod ttl;

// Internal, crate-only modules
mod entry;
mod loader;
mod shared;
mod store;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
#[cfg(feature = "serde")]
pub use config::{CacheConfig, ConfigError};
pub use error::{BuildError, CacheError, Result, SharedError};
pub use freshness::{Freshness, FreshnessPolicy, DEFAULT_STALE_MULTIPLIER};
pub use handles::{DataCache, ReadOptions};
pub use key::CacheKey;
pub use metrics::MetricsSnapshot;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use runtime::TaskSpawner;
pub use subscriber::{Subscription, UpdateCallback};
pub use time::{Clock, ManualClock, MonotonicClock};
pub use ttl::TtlTier;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Lookups ---
  pub(crate) fresh_hits: CachePadded<AtomicU64>,
  pub(crate) stale_hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Fetches ---
  pub(crate) fetches_started: CachePadded<AtomicU64>,
  pub(crate) fetches_joined: CachePadded<AtomicU64>,
  pub(crate) fetch_successes: CachePadded<AtomicU64>,
  pub(crate) fetch_failures: CachePadded<AtomicU64>,
  pub(crate) fetches_abandoned: CachePadded<AtomicU64>,
  pub(crate) background_refreshes: CachePadded<AtomicU64>,

  // --- Writes ---
  pub(crate) optimistic_writes: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Subscribers ---
  pub(crate) notifications: CachePadded<AtomicU64>,
  pub(crate) subscriber_panics: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      fresh_hits: CachePadded::new(AtomicU64::new(0)),
      stale_hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      fetches_started: CachePadded::new(AtomicU64::new(0)),
      fetches_joined: CachePadded::new(AtomicU64::new(0)),
      fetch_successes: CachePadded::new(AtomicU64::new(0)),
      fetch_failures: CachePadded::new(AtomicU64::new(0)),
      fetches_abandoned: CachePadded::new(AtomicU64::new(0)),
      background_refreshes: CachePadded::new(AtomicU64::new(0)),
      optimistic_writes: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      notifications: CachePadded::new(AtomicU64::new(0)),
      subscriber_panics: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
  counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let fresh_hits = self.fresh_hits.load(Ordering::Relaxed);
    let stale_hits = self.stale_hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = fresh_hits + stale_hits + misses;

    MetricsSnapshot {
      fresh_hits,
      stale_hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        (fresh_hits + stale_hits) as f64 / total_lookups as f64
      },
      fetches_started: self.fetches_started.load(Ordering::Relaxed),
      fetches_joined: self.fetches_joined.load(Ordering::Relaxed),
      fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
      fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
      fetches_abandoned: self.fetches_abandoned.load(Ordering::Relaxed),
      background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
      optimistic_writes: self.optimistic_writes.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      notifications: self.notifications.load(Ordering::Relaxed),
      subscriber_panics: self.subscriber_panics.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone, PartialEq)]
pub struct MetricsSnapshot {
  /// Reads answered from a fresh entry.
  pub fresh_hits: u64,
  /// Reads answered from a stale entry (each one may start a refresh).
  pub stale_hits: u64,
  /// Reads that had to wait for a fetch, including forced refreshes.
  pub misses: u64,
  /// The cache hit ratio ((fresh + stale) / all lookups).
  pub hit_ratio: f64,
  /// Fetches actually started, i.e. fetch functions invoked.
  pub fetches_started: u64,
  /// Reads that attached to an already running fetch instead of starting one.
  pub fetches_joined: u64,
  /// Fetches that produced a value.
  pub fetch_successes: u64,
  /// Fetches whose fetch function returned an error.
  pub fetch_failures: u64,
  /// Fetch tasks dropped before producing a result.
  pub fetches_abandoned: u64,
  /// Fetches started in the background to refresh stale data.
  pub background_refreshes: u64,
  /// Values written directly with `set`.
  pub optimistic_writes: u64,
  /// Entries removed by `invalidate` or `clear`.
  pub invalidations: u64,
  /// Subscriber callbacks invoked successfully.
  pub notifications: u64,
  /// Subscriber callbacks that panicked.
  pub subscriber_panics: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("fresh_hits", &self.fresh_hits)
      .field("stale_hits", &self.stale_hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("fetches_started", &self.fetches_started)
      .field("fetches_joined", &self.fetches_joined)
      .field("fetch_successes", &self.fetch_successes)
      .field("fetch_failures", &self.fetch_failures)
      .field("fetches_abandoned", &self.fetches_abandoned)
      .field("background_refreshes", &self.background_refreshes)
      .field("optimistic_writes", &self.optimistic_writes)
      .field("invalidations", &self.invalidations)
      .field("notifications", &self.notifications)
      .field("subscriber_panics", &self.subscriber_panics)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

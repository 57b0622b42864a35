//! Time sources used to stamp entries and measure their age.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  Instant::now().saturating_duration_since(*CACHE_EPOCH)
}

/// A monotonic time source.
///
/// The cache never looks at wall-clock time. All it needs is a point on a
/// monotonic line, expressed as the elapsed `Duration` since some fixed
/// origin, so that entry ages can be computed by subtraction.
pub trait Clock: Send + Sync + 'static {
  /// Returns the current time as a duration since the clock's origin.
  fn now(&self) -> Duration;
}

/// The default clock, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
  #[inline]
  fn now(&self) -> Duration {
    now_duration()
  }
}

/// A clock that only moves when told to.
///
/// Useful for exercising freshness boundaries deterministically: build the
/// cache with an `Arc<ManualClock>`, keep a clone, and `advance` it between
/// operations.
#[derive(Default)]
pub struct ManualClock {
  nanos: AtomicU64,
}

impl ManualClock {
  /// Creates a clock positioned at its origin.
  pub fn new() -> Self {
    Self::default()
  }

  /// Moves the clock forward by `by`.
  pub fn advance(&self, by: Duration) {
    self
      .nanos
      .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
  }

  /// Positions the clock at an absolute offset from its origin.
  pub fn set(&self, at: Duration) {
    self.nanos.store(at.as_nanos() as u64, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Duration {
    Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
  }
}

impl fmt::Debug for ManualClock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualClock")
      .field("now", &self.now())
      .finish()
  }
}

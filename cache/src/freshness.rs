//! Freshness classification.
//!
//! An entry written at `t` and read with a time-to-live `ttl` is:
//!
//! - **Fresh** while `age < ttl`: served from memory, nothing else happens.
//! - **Stale** while `ttl <= age < ttl * stale_multiplier`: served from
//!   memory, and a background refresh is started.
//! - **Absent** once `age >= ttl * stale_multiplier`, or when there is no
//!   entry at all: the caller waits for a fetch.
//!
//! The TTL belongs to the call, not the entry. Two callers may read the same
//! key with different TTLs and get different answers.

use std::time::Duration;

/// The staleness multiplier used when none is configured.
pub const DEFAULT_STALE_MULTIPLIER: u32 = 3;

/// How usable a cached entry is for a particular read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
  /// Younger than the TTL.
  Fresh,
  /// Older than the TTL but still inside the stale window.
  Stale,
  /// Missing, or too old to be served at all.
  Absent,
}

impl Freshness {
  /// Returns `true` if a value in this state may be returned to a caller.
  #[inline]
  pub fn is_usable(self) -> bool {
    !matches!(self, Freshness::Absent)
  }
}

/// Classifies an entry given when it was written.
///
/// `written_at` and `now` are points on the same monotonic line. A clock that
/// appears to run backwards yields an age of zero.
pub fn classify(
  written_at: Option<Duration>,
  now: Duration,
  ttl: Duration,
  stale_multiplier: u32,
) -> Freshness {
  let Some(written_at) = written_at else {
    return Freshness::Absent;
  };
  let age = now.saturating_sub(written_at);

  if age < ttl {
    Freshness::Fresh
  } else if age < ttl.saturating_mul(stale_multiplier) {
    Freshness::Stale
  } else {
    Freshness::Absent
  }
}

/// The per-cache freshness configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
  stale_multiplier: u32,
}

impl FreshnessPolicy {
  pub fn new(stale_multiplier: u32) -> Self {
    Self { stale_multiplier }
  }

  #[inline]
  pub fn stale_multiplier(&self) -> u32 {
    self.stale_multiplier
  }

  /// The age at which an entry read with `ttl` stops being served.
  #[inline]
  pub fn stale_window(&self, ttl: Duration) -> Duration {
    ttl.saturating_mul(self.stale_multiplier)
  }

  #[inline]
  pub fn classify(&self, written_at: Option<Duration>, now: Duration, ttl: Duration) -> Freshness {
    classify(written_at, now, ttl, self.stale_multiplier)
  }
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self::new(DEFAULT_STALE_MULTIPLIER)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const T0: Duration = Duration::from_secs(1_000);
  const TTL: Duration = Duration::from_millis(30_000);

  fn at(offset_ms: u64) -> Duration {
    T0 + Duration::from_millis(offset_ms)
  }

  #[test]
  fn boundaries_with_default_multiplier() {
    let policy = FreshnessPolicy::default();
    let written = Some(T0);

    assert_eq!(policy.classify(written, at(0), TTL), Freshness::Fresh);
    assert_eq!(policy.classify(written, at(29_999), TTL), Freshness::Fresh);
    assert_eq!(policy.classify(written, at(30_000), TTL), Freshness::Stale);
    assert_eq!(policy.classify(written, at(30_001), TTL), Freshness::Stale);
    assert_eq!(policy.classify(written, at(89_999), TTL), Freshness::Stale);
    assert_eq!(policy.classify(written, at(90_000), TTL), Freshness::Absent);
    assert_eq!(policy.classify(written, at(90_001), TTL), Freshness::Absent);
  }

  #[test]
  fn missing_entry_is_absent() {
    assert_eq!(classify(None, T0, TTL, 3), Freshness::Absent);
  }

  #[test]
  fn zero_ttl_never_serves() {
    assert_eq!(classify(Some(T0), T0, Duration::ZERO, 3), Freshness::Absent);
  }

  #[test]
  fn multiplier_of_one_has_no_stale_window() {
    assert_eq!(classify(Some(T0), at(29_999), TTL, 1), Freshness::Fresh);
    assert_eq!(classify(Some(T0), at(30_000), TTL, 1), Freshness::Absent);
  }

  #[test]
  fn clock_skew_counts_as_brand_new() {
    let earlier = T0 - Duration::from_secs(5);
    assert_eq!(classify(Some(T0), earlier, TTL, 3), Freshness::Fresh);
  }

  #[test]
  fn stale_window_scales_with_multiplier() {
    assert_eq!(FreshnessPolicy::new(5).stale_window(TTL), Duration::from_secs(150));
    assert!(Freshness::Stale.is_usable());
    assert!(!Freshness::Absent.is_usable());
  }
}

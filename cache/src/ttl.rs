use std::fmt;
use std::time::Duration;

/// Named TTL presets.
///
/// The cache does not enforce these; they exist so call sites agree on a
/// small vocabulary of lifetimes instead of scattering magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TtlTier {
  /// Always fetch. Concurrent reads are still deduplicated.
  Instant,
  /// 30 seconds. Dashboards, counters.
  Short,
  /// 2 minutes.
  Medium,
  /// 5 minutes.
  Long,
  /// 10 minutes. Reference data that rarely changes.
  Static,
}

impl TtlTier {
  pub const ALL: [TtlTier; 5] = [
    TtlTier::Instant,
    TtlTier::Short,
    TtlTier::Medium,
    TtlTier::Long,
    TtlTier::Static,
  ];

  pub const fn duration(self) -> Duration {
    match self {
      TtlTier::Instant => Duration::ZERO,
      TtlTier::Short => Duration::from_secs(30),
      TtlTier::Medium => Duration::from_secs(2 * 60),
      TtlTier::Long => Duration::from_secs(5 * 60),
      TtlTier::Static => Duration::from_secs(10 * 60),
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      TtlTier::Instant => "instant",
      TtlTier::Short => "short",
      TtlTier::Medium => "medium",
      TtlTier::Long => "long",
      TtlTier::Static => "static",
    }
  }
}

impl From<TtlTier> for Duration {
  fn from(tier: TtlTier) -> Self {
    tier.duration()
  }
}

impl fmt::Display for TtlTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

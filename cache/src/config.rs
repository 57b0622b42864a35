//! Deserializable cache configuration.
//!
//! ```yaml
//! shards: 8
//! stale_multiplier: 3
//! ttl:
//!   short: 45s
//!   static: 30m
//! ```
//!
//! Durations use humantime notation (`"250ms"`, `"30s"`, `"2m"`, `"1h 30m"`).

use crate::freshness::DEFAULT_STALE_MULTIPLIER;
use crate::ttl::TtlTier;

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors raised while reading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Failed to parse cache configuration: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("Failed to read cache configuration file: {0}")]
  Read(#[from] std::io::Error),
}

fn default_stale_multiplier() -> u32 {
  DEFAULT_STALE_MULTIPLIER
}

fn opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<String> = Option::deserialize(deserializer)?;
  raw
    .map(|text| humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom))
    .transpose()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
  /// Number of entry-store shards. Rounded up to a power of two.
  #[serde(default)]
  pub shards: Option<usize>,
  #[serde(default = "default_stale_multiplier")]
  pub stale_multiplier: u32,
  #[serde(default)]
  pub ttl: TtlOverrides,
}

/// Per-tier TTL overrides. Unset tiers keep their built-in durations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtlOverrides {
  #[serde(default, deserialize_with = "opt_duration")]
  pub instant: Option<Duration>,
  #[serde(default, deserialize_with = "opt_duration")]
  pub short: Option<Duration>,
  #[serde(default, deserialize_with = "opt_duration")]
  pub medium: Option<Duration>,
  #[serde(default, deserialize_with = "opt_duration")]
  pub long: Option<Duration>,
  #[serde(default, rename = "static", deserialize_with = "opt_duration")]
  pub static_: Option<Duration>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      shards: None,
      stale_multiplier: DEFAULT_STALE_MULTIPLIER,
      ttl: TtlOverrides::default(),
    }
  }
}

impl CacheConfig {
  pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
  }

  pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_yaml_str(&text)
  }

  /// The TTL for `tier`, honouring overrides.
  pub fn ttl(&self, tier: TtlTier) -> Duration {
    let override_ = match tier {
      TtlTier::Instant => self.ttl.instant,
      TtlTier::Short => self.ttl.short,
      TtlTier::Medium => self.ttl.medium,
      TtlTier::Long => self.ttl.long,
      TtlTier::Static => self.ttl.static_,
    };
    override_.unwrap_or_else(|| tier.duration())
  }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;
use tutor_cache::{DataCache, ManualClock};

pub const TTL: Duration = Duration::from_millis(30_000);

/// The error every test fetcher fails with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream unavailable: {0}")]
pub struct UpstreamError(pub &'static str);

pub type Fetch = BoxFuture<'static, Result<String, UpstreamError>>;

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tutor_cache=debug")),
    )
    .with_test_writer()
    .try_init();
}

// Helper to build a cache on a manual clock. Must be called inside a Tokio runtime.
pub fn build_test_cache() -> (DataCache<String>, Arc<ManualClock>) {
  build_test_cache_with_multiplier(tutor_cache::DEFAULT_STALE_MULTIPLIER)
}

pub fn build_test_cache_with_multiplier(multiplier: u32) -> (DataCache<String>, Arc<ManualClock>) {
  init_tracing();
  let clock = Arc::new(ManualClock::new());
  let cache = DataCache::builder()
    .shards(4)
    .stale_multiplier(multiplier)
    .clock(clock.clone())
    .build()
    .unwrap();
  (cache, clock)
}

/// Hands out fetchers and counts how many of them were actually invoked.
#[derive(Clone, Default)]
pub struct FetchCounter(Arc<AtomicUsize>);

impl FetchCounter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn count(&self) -> usize {
    self.0.load(Ordering::SeqCst)
  }

  pub fn ok(&self, value: &str) -> impl FnOnce() -> Fetch + Send + 'static {
    let counter = self.0.clone();
    let value = value.to_string();
    move || -> Fetch {
      counter.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move { Ok(value) })
    }
  }

  pub fn fail(&self, reason: &'static str) -> impl FnOnce() -> Fetch + Send + 'static {
    let counter = self.0.clone();
    move || -> Fetch {
      counter.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move { Err(UpstreamError(reason)) })
    }
  }

  /// A fetcher that does not complete until `gate` receives a permit.
  pub fn gated(
    &self,
    gate: &Arc<Semaphore>,
    outcome: Result<&str, &'static str>,
  ) -> impl FnOnce() -> Fetch + Send + 'static {
    let counter = self.0.clone();
    let gate = gate.clone();
    let outcome = outcome.map(str::to_string).map_err(UpstreamError);
    move || -> Fetch {
      counter.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move {
        let _permit = gate.acquire().await.expect("gate closed");
        outcome
      })
    }
  }
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut condition: F) {
  let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
  while !condition() {
    assert!(
      tokio::time::Instant::now() < deadline,
      "timed out waiting for {what}"
    );
    tokio::time::sleep(Duration::from_millis(2)).await;
  }
}

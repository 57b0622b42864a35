mod common;

use common::{build_test_cache, eventually, FetchCounter, TTL};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

#[tokio::test]
async fn test_stale_read_returns_immediately_and_refreshes() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();
  let gate = Arc::new(Semaphore::new(0));

  cache.set("teacher:lessons", "v1".to_string());
  clock.advance(Duration::from_secs(45));

  // The refresh is held open, yet the read still completes with the old value.
  let value = cache
    .read("teacher:lessons", TTL, fetches.gated(&gate, Ok("v2")))
    .await
    .unwrap();
  assert_eq!(*value, "v1");
  assert!(cache.is_loading("teacher:lessons"));
  assert_eq!(cache.metrics().stale_hits, 1);
  assert_eq!(cache.metrics().background_refreshes, 1);

  gate.add_permits(1);
  eventually("the refresh to finish", || !cache.is_loading("teacher:lessons")).await;

  assert_eq!(*cache.peek("teacher:lessons").unwrap(), "v2");
  assert!(cache.is_fresh("teacher:lessons", TTL));
  assert_eq!(fetches.count(), 1);
}

#[tokio::test]
async fn test_many_stale_reads_start_one_refresh() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();
  let gate = Arc::new(Semaphore::new(0));

  cache.set("k", "v1".to_string());
  clock.advance(Duration::from_secs(31));

  for _ in 0..10 {
    let value = cache
      .read("k", TTL, fetches.gated(&gate, Ok("v2")))
      .await
      .unwrap();
    assert_eq!(*value, "v1");
  }
  gate.add_permits(1);
  eventually("the refresh to finish", || !cache.is_loading("k")).await;

  assert_eq!(fetches.count(), 1);
  assert_eq!(cache.metrics().stale_hits, 10);
  assert_eq!(cache.metrics().background_refreshes, 1);
  assert_eq!(*cache.peek("k").unwrap(), "v2");
}

#[tokio::test]
async fn test_failed_refresh_keeps_the_old_value() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();

  cache.set("k", "v1".to_string());
  clock.advance(Duration::from_secs(31));

  let value = cache.read("k", TTL, fetches.fail("offline")).await.unwrap();
  assert_eq!(*value, "v1");
  eventually("the refresh to fail", || cache.metrics().fetch_failures == 1).await;
  eventually("the registry to clear", || !cache.is_loading("k")).await;

  assert_eq!(*cache.peek("k").unwrap(), "v1");

  // The entry is still stale, so the next read tries again.
  let value = cache.read("k", TTL, fetches.ok("v2")).await.unwrap();
  assert_eq!(*value, "v1");
  eventually("the second refresh to land", || {
    cache.peek("k").map(|v| v.as_str() == "v2").unwrap_or(false)
  })
  .await;
  assert_eq!(fetches.count(), 2);
}

#[tokio::test]
async fn test_past_the_stale_window_the_caller_waits() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();

  cache.set("k", "ancient".to_string());
  clock.advance(Duration::from_secs(90));

  let value = cache.read("k", TTL, fetches.ok("current")).await.unwrap();
  assert_eq!(*value, "current");
  assert_eq!(cache.metrics().stale_hits, 0);
  assert_eq!(cache.metrics().misses, 1);
}

#[tokio::test]
async fn test_stale_read_joins_running_fetch_without_waiting() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();
  let gate = Arc::new(Semaphore::new(0));

  cache.set("k", "v1".to_string());
  clock.advance(Duration::from_secs(31));
  cache.prefetch("k", fetches.gated(&gate, Ok("v2")));
  assert!(cache.is_loading("k"));

  let value = cache.read("k", TTL, fetches.ok("unused")).await.unwrap();
  assert_eq!(*value, "v1");
  assert_eq!(cache.metrics().background_refreshes, 0);

  gate.add_permits(1);
  eventually("the prefetch to land", || !cache.is_loading("k")).await;
  assert_eq!(fetches.count(), 1);
  assert_eq!(*cache.peek("k").unwrap(), "v2");
}

#[tokio::test]
async fn test_background_read_never_waits() {
  let (cache, clock) = build_test_cache();
  let fetches = FetchCounter::new();
  let gate = Arc::new(Semaphore::new(0));

  // Nothing cached: returns nothing, but starts a fetch.
  assert!(cache
    .read_background("k", TTL, fetches.gated(&gate, Ok("v1")))
    .is_none());
  assert!(cache.is_loading("k"));
  gate.add_permits(1);
  eventually("the first fetch to land", || cache.peek("k").is_some()).await;

  // Fresh: returned as-is, nothing started.
  let value = cache.read_background("k", TTL, fetches.ok("unused"));
  assert_eq!(value.as_deref().map(String::as_str), Some("v1"));
  assert!(!cache.is_loading("k"));
  assert_eq!(fetches.count(), 1);

  // Beyond the stale window the old value is still handed back.
  clock.advance(Duration::from_secs(120));
  let value = cache.read_background("k", TTL, fetches.ok("v2"));
  assert_eq!(value.as_deref().map(String::as_str), Some("v1"));
  eventually("the refresh to land", || {
    cache.peek("k").map(|v| v.as_str() == "v2").unwrap_or(false)
  })
  .await;
  assert_eq!(fetches.count(), 2);
}

#[tokio::test]
async fn test_background_read_failure_is_silent() {
  let (cache, _clock) = build_test_cache();
  let fetches = FetchCounter::new();

  assert!(cache.read_background("k", TTL, fetches.fail("nope")).is_none());
  eventually("the fetch to fail", || cache.metrics().fetch_failures == 1).await;
  eventually("the registry to clear", || !cache.is_loading("k")).await;
  assert!(cache.peek("k").is_none());
}

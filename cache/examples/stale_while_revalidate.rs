use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tutor_cache::{CacheKey, DataCache, ManualClock};

#[derive(Debug, Clone, PartialEq)]
struct Lessons {
  version: usize,
  titles: Vec<String>,
}

type LessonsFetch = Pin<Box<dyn Future<Output = Result<Lessons, std::io::Error>> + Send>>;

/// Builds a fetcher that simulates a slow call to the lesson service.
fn fetch_lessons(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> LessonsFetch + Send + 'static {
  let counter = counter.clone();
  move || -> LessonsFetch {
    Box::pin(async move {
      let version = counter.fetch_add(1, Ordering::SeqCst) + 1;
      println!("[Fetcher] Loading lessons, version {}...", version);
      tokio::time::sleep(Duration::from_millis(300)).await;
      Ok(Lessons {
        version,
        titles: vec![format!("Algebra (rev {})", version)],
      })
    })
  }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let fetch_counter = Arc::new(AtomicUsize::new(0));
  let clock = Arc::new(ManualClock::new());

  let cache: DataCache<Lessons> = DataCache::builder().clock(clock.clone()).build()?;
  let _subscription = cache.subscribe("teacher:lessons", |key: &CacheKey, lessons: &Arc<Lessons>| {
    println!(
      "[Subscriber] {} now at version {}: {:?}",
      key, lessons.version, lessons.titles
    );
  });

  let key = "teacher:lessons";
  let ttl = Duration::from_secs(30);

  println!("--- Step 1: Initial Load ---");
  let value1 = cache.read(key, ttl, fetch_lessons(&fetch_counter)).await?;
  println!("Received: {:?}", *value1);
  assert_eq!(value1.version, 1);

  println!("\n--- Step 2: Cache Hit (Fresh) ---");
  let value2 = cache.read(key, ttl, fetch_lessons(&fetch_counter)).await?;
  println!("Received: {:?}", *value2);
  assert_eq!(value2.version, 1);
  assert_eq!(fetch_counter.load(Ordering::Relaxed), 1);

  println!("\n--- Step 3: Move the clock past the TTL (45 seconds) ---");
  clock.advance(Duration::from_secs(45));

  println!("\n--- Step 4: Stale Read ---");
  let value3 = cache.read(key, ttl, fetch_lessons(&fetch_counter)).await?;
  println!("IMMEDIATELY Received (stale): {:?}", *value3);
  assert_eq!(value3.version, 1, "Should return stale version 1 immediately");
  println!("A background refresh is running: {}", cache.is_loading(key));

  println!("\n--- Step 5: Wait for Background Refresh to Complete ---");
  while cache.is_loading(key) {
    tokio::time::sleep(Duration::from_millis(50)).await;
  }

  println!("\n--- Step 6: Final Read (Fresh) ---");
  let value4 = cache.read(key, ttl, fetch_lessons(&fetch_counter)).await?;
  println!("Received (refreshed): {:?}", *value4);
  assert_eq!(value4.version, 2, "Should now have the refreshed version 2");

  println!("\n--- Step 7: Invalidate the teacher namespace ---");
  let removed = cache.invalidate("teacher");
  println!("Removed {} entries; cached value: {:?}", removed, cache.peek(key));

  println!("\nCache metrics: {:#?}", cache.metrics());
  Ok(())
}

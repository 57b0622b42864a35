use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures_util::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tutor_cache::{DataCache, ManualClock};

const NUM_KEYS: u64 = 10_000;
const TTL: Duration = Duration::from_secs(30);

fn key_for(i: u64) -> String {
  format!("bench:item:{}", i)
}

// Pre-populates every key so that reads never reach the fetcher.
fn populated_cache(rt: &Runtime) -> (DataCache<u64>, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new());
  let cache = rt.block_on(async {
    DataCache::<u64>::builder()
      .clock(clock.clone())
      .build()
      .expect("runtime available")
  });
  for i in 0..NUM_KEYS {
    cache.set(key_for(i), i);
  }
  (cache, clock)
}

async fn never_called() -> Result<u64, std::io::Error> {
  Ok(0)
}

fn fresh_reads(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let (cache, _clock) = populated_cache(&rt);

  let mut group = c.benchmark_group("FreshRead");
  group.throughput(Throughput::Elements(NUM_KEYS));
  group.bench_function("sequential", |b| {
    b.to_async(&rt).iter(|| async {
      for i in 0..NUM_KEYS {
        black_box(cache.read(key_for(i), TTL, never_called).await.ok());
      }
    })
  });

  for tasks in [4u64, 8] {
    group.bench_with_input(BenchmarkId::new("concurrent", tasks), &tasks, |b, &tasks| {
      b.to_async(&rt).iter(|| {
        let cache = cache.clone();
        async move {
          let per_task = NUM_KEYS / tasks;
          let handles = (0..tasks).map(|t| {
            let cache = cache.clone();
            tokio::spawn(async move {
              for i in (t * per_task)..((t + 1) * per_task) {
                black_box(cache.read(key_for(i), TTL, never_called).await.ok());
              }
            })
          });
          future::join_all(handles).await;
        }
      })
    });
  }
  group.finish();
}

fn peeks(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let (cache, clock) = populated_cache(&rt);
  // Every entry is stale; peek must not care.
  clock.advance(Duration::from_secs(45));

  let mut group = c.benchmark_group("Peek");
  group.throughput(Throughput::Elements(NUM_KEYS));
  group.bench_function("stale_entries", |b| {
    b.iter(|| {
      for i in 0..NUM_KEYS {
        black_box(cache.peek(key_for(i)));
      }
    })
  });
  group.finish();
}

fn misses(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let (cache, _clock) = populated_cache(&rt);

  c.bench_function("MissThenFetch", |b| {
    b.to_async(&rt).iter(|| async {
      cache.invalidate("bench:miss");
      black_box(
        cache
          .read("bench:miss", TTL, || async { Ok::<_, std::io::Error>(1) })
          .await
          .ok(),
      );
    })
  });
}

criterion_group!(benches, fresh_reads, peeks, misses);
criterion_main!(benches);

//! Memory provider hot-path benchmarks
//!
//! Run with: cargo bench --features benchmarks

use cache_manager::{CacheStore, EvictionPolicy, MemoryCacheConfig, MemoryCacheProvider};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn bench_config() -> MemoryCacheConfig {
    MemoryCacheConfig {
        max_entries: 10_000,
        max_memory_bytes: 64 * 1024 * 1024,
        eviction_policy: EvictionPolicy::Lru,
        sweep_interval_ms: 0,
    }
}

fn memory_set_get(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = MemoryCacheProvider::new(bench_config());

    c.bench_function("memory_set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            runtime.block_on(async {
                cache
                    .set(&format!("bench:{}", i % 5_000), json!({"n": i}), 300, None)
                    .await
                    .unwrap();
            });
        });
    });

    runtime.block_on(async {
        for i in 0..5_000u64 {
            cache
                .set(&format!("bench:{i}"), json!({"n": i}), 300, None)
                .await
                .unwrap();
        }
    });

    c.bench_function("memory_get_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            runtime.block_on(async {
                black_box(cache.get(&format!("bench:{}", i % 5_000)).await.unwrap());
            });
        });
    });
}

fn memory_eviction_pressure(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = MemoryCacheProvider::new(MemoryCacheConfig {
        max_entries: 100,
        ..bench_config()
    });

    // Every set past the bound pays for one victim scan
    c.bench_function("memory_set_under_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            runtime.block_on(async {
                cache
                    .set(&format!("pressure:{i}"), json!(i), 300, None)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, memory_set_get, memory_eviction_pressure);
criterion_main!(benches);

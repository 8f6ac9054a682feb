//! Throughput Benchmark for driftkv
//!
//! Measures the storage engine on its own and the full dispatch path, with
//! and without the append log.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use driftkv::commands::CommandHandler;
use driftkv::persistence::AppendLog;
use driftkv::protocol::{Request, RespValue};
use driftkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

fn request(parts: &[&[u8]]) -> Request {
    parts
        .iter()
        .map(|p| RespValue::bulk_string(Bytes::copy_from_slice(p)))
        .collect()
}

/// Benchmark SET and GET on the string namespace
fn bench_strings(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("strings");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(Bytes::from(format!("new:{}", i)), Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_1k_with_ttl", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            engine.set_with_ttl(
                Bytes::from(format!("ttl:{}", i)),
                value.clone(),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the hash namespace, including a single hot field
fn bench_hashes(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("hashes");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hset_spread", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.hset(
                Bytes::from(format!("user:{}", i % 1000)),
                Bytes::from(format!("field:{}", i % 16)),
                Bytes::from("v"),
            ));
            i += 1;
        });
    });

    group.bench_function("hset_hot_field", |b| {
        let key = Bytes::from("hot");
        let field = Bytes::from("f");
        b.iter(|| {
            black_box(engine.hset(key.clone(), field.clone(), Bytes::from("v")));
        });
    });

    group.bench_function("hget", |b| {
        let key = Bytes::from("hot");
        let field = Bytes::from("f");
        b.iter(|| {
            black_box(engine.hget(&key, &field));
        });
    });

    group.finish();
}

/// Benchmark concurrent access on disjoint keys
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.set(key.clone(), Bytes::from("value"));
                            engine.get(&key);
                            engine.hset(key, Bytes::from("f"), Bytes::from("v"));
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark the expiry sweep and the KEYS snapshot
fn bench_maintenance(c: &mut Criterion) {
    let mut group = c.benchmark_group("maintenance");

    group.bench_function("cleanup_10k_expired", |b| {
        b.iter_batched(
            || {
                let engine = StorageEngine::new();
                for i in 0..10_000 {
                    engine.set_with_ttl(
                        Bytes::from(format!("key:{}", i)),
                        Bytes::from("v"),
                        Duration::ZERO,
                    );
                }
                engine
            },
            |engine| black_box(engine.cleanup_expired()),
            BatchSize::LargeInput,
        );
    });

    let engine = StorageEngine::new();
    for i in 0..1_000 {
        engine.set(Bytes::from(format!("user:{}", i)), Bytes::from("data"));
        engine.hset(
            Bytes::from(format!("profile:{}", i)),
            Bytes::from("name"),
            Bytes::from("x"),
        );
    }

    group.bench_function("keys_2k", |b| {
        b.iter(|| black_box(engine.keys()));
    });

    group.finish();
}

/// Benchmark the dispatcher, memory only versus logging every mutation
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let memory = CommandHandler::new(Arc::new(StorageEngine::new()));
    group.bench_function("get_memory", |b| {
        b.iter(|| black_box(memory.execute(request(&[b"GET", b"key"]))));
    });
    group.bench_function("set_memory", |b| {
        b.iter(|| black_box(memory.execute(request(&[b"SET", b"key", b"value"]))));
    });

    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(AppendLog::open(dir.path().join("bench.aof")).unwrap());
    let logged = CommandHandler::with_log(Arc::new(StorageEngine::new()), log);

    group.sample_size(20);
    group.bench_function("set_with_fsync", |b| {
        b.iter(|| black_box(logged.execute(request(&[b"SET", b"key", b"value"]))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_strings,
    bench_hashes,
    bench_concurrent,
    bench_maintenance,
    bench_dispatch,
);

criterion_main!(benches);

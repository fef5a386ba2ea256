//! Throughput benchmarks for RapidKV
//!
//! Measures the storage engine, the command table and the wire codec
//! under a few representative workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rapidkv::commands::{CommandContext, CommandTable};
use rapidkv::protocol::{decode, Value};
use rapidkv::storage::{Database, DatabaseRegistry, ExpiryConfig, SetMode, DEFAULT_DATABASES};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn value(s: &str) -> Value {
    Value::bulk_string(Bytes::from(s.to_string()))
}

fn bench_set(c: &mut Criterion) {
    let db = Database::new(0, 32);

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            db.set(key, value("small_value"), SetMode::Any, 0);
            i += 1;
        });
    });

    group.bench_function("set_1kb_with_ttl", |b| {
        let mut i = 0u64;
        let payload = Value::bulk_string(Bytes::from("x".repeat(1024)));
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            db.set(key, payload.clone(), SetMode::Any, 3_600_000);
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let db = Database::new(0, 32);
    for i in 0..100_000 {
        db.set(
            Bytes::from(format!("key:{}", i)),
            value(&format!("value:{}", i)),
            SetMode::Any,
            0,
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(db.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(db.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// INCR through the full command table, under the shared db gate
fn bench_incr(c: &mut Criterion) {
    let table = CommandTable::new();
    let databases = DatabaseRegistry::new(32, DEFAULT_DATABASES, ExpiryConfig::default());
    let db = databases.primary();
    let ctx = CommandContext {
        db: &db,
        databases: &databases,
    };

    let mut group = c.benchmark_group("incr");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_counter", |b| {
        let request = vec![value("INCR"), value("counter")];
        b.iter(|| {
            let _gate = db.shared();
            black_box(table.dispatch(&ctx, &request));
        });
    });

    group.bench_function("multiple_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let request = vec![value("INCR"), value(&format!("counter:{}", i % 1000))];
            let _gate = db.shared();
            black_box(table.dispatch(&ctx, &request));
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_set_get", |b| {
        b.iter(|| {
            let db = Arc::new(Database::new(0, 32));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            db.set(key.clone(), value("value"), SetMode::Any, 0);
                            black_box(db.get(&key));
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(db.count());
        });
    });

    group.finish();
}

fn bench_keys(c: &mut Criterion) {
    let db = Database::new(0, 32);
    for i in 0..1_000 {
        for prefix in ["user", "session", "cache"] {
            db.set(
                Bytes::from(format!("{}:{}", prefix, i)),
                value("data"),
                SetMode::Any,
                0,
            );
        }
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| black_box(db.keys(b"user:*").unwrap()));
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| black_box(db.keys(b"*").unwrap()));
    });

    group.finish();
}

/// Two-pass encoding of a mid-sized reply, and request decoding
fn bench_codec(c: &mut Criterion) {
    let reply = Value::array(
        (0..100)
            .map(|i| {
                if i % 2 == 0 {
                    value(&format!("element:{}", i))
                } else {
                    Value::integer(i)
                }
            })
            .collect(),
    );
    let request = b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n";

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function("measure_write", |b| {
        let mut buf = Vec::new();
        b.iter(|| {
            buf.clear();
            buf.resize(reply.measure(), 0);
            black_box(reply.write(&mut buf).unwrap());
        });
    });

    group.bench_function("decode_request", |b| {
        b.iter(|| black_box(decode(request).unwrap()));
    });

    group.bench_function("decode_inline", |b| {
        b.iter(|| black_box(decode(b"SET name \"Ariz Kamizuki\"\r\n").unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_incr,
    bench_concurrent,
    bench_keys,
    bench_codec,
);

criterion_main!(benches);

//! Performance benchmarks for syncstore-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use syncstore_engine::{FieldPolicy, Item, MemoryResource, Record, Store, StoreConfig};
use tokio::runtime::{Builder, Runtime};

fn runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

fn user(id: usize) -> Record {
    json!({
        "id": id,
        "name": format!("User {id}"),
        "email": format!("user{id}@test.com"),
        "selected": false,
    })
    .as_object()
    .cloned()
    .expect("object literal")
}

fn config() -> StoreConfig {
    StoreConfig::new("users", "memory://users", "id").with_hidden_field("selected")
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let rt = runtime();
    let _guard = rt.enter();

    for size in [100, 1000, 5000].iter() {
        let data: Vec<Record> = (0..*size).map(user).collect();

        group.bench_with_input(BenchmarkId::new("initial", size), size, |b, _| {
            b.iter(|| {
                let store = Store::new(config(), Arc::new(MemoryResource::new("id"))).unwrap();
                store.merge(black_box(data.clone()))
            })
        });

        group.bench_with_input(BenchmarkId::new("unchanged", size), size, |b, _| {
            let store = Store::new(config(), Arc::new(MemoryResource::new("id"))).unwrap();
            store.merge(data.clone());
            b.iter(|| store.merge(black_box(data.clone())))
        });

        // Every record changes, so each merge overwrites all of them.
        group.bench_with_input(BenchmarkId::new("all_updated", size), size, |b, _| {
            let store = Store::new(config(), Arc::new(MemoryResource::new("id"))).unwrap();
            store.merge(data.clone());
            let mut round = 0u64;
            b.iter(|| {
                round += 1;
                let edited: Vec<Record> = data
                    .iter()
                    .cloned()
                    .map(|mut r| {
                        r.insert("round".into(), json!(round));
                        r
                    })
                    .collect();
                store.merge(black_box(edited))
            })
        });
    }

    group.finish();
}

fn bench_change_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_detection");
    let policy = config().field_policy();
    let value = user(7);
    let item = Item::wrap(&value, &policy);

    group.bench_function("has_changed_equal", |b| {
        b.iter(|| item.has_changed(black_box(&value), &policy))
    });

    let mut hidden_only = value.clone();
    hidden_only.insert("selected".into(), json!(true));
    group.bench_function("has_changed_hidden_only", |b| {
        b.iter(|| item.has_changed(black_box(&hidden_only), &policy))
    });

    let mut edited = value.clone();
    edited.insert("name".into(), json!("Someone Else"));
    group.bench_function("has_changed_edited", |b| {
        b.iter(|| item.has_changed(black_box(&edited), &policy))
    });

    group.bench_function("visible_projection", |b| {
        b.iter(|| FieldPolicy::visible(&policy, black_box(&value)))
    });

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let rt = runtime();
    let _guard = rt.enter();

    for size in [100, 1000, 5000].iter() {
        // Nothing changed: the pass only diffs and schedules no calls.
        group.bench_with_input(BenchmarkId::new("clean", size), size, |b, &size| {
            let store = Store::new(config(), Arc::new(MemoryResource::new("id"))).unwrap();
            store.merge((0..size).map(user).collect());
            b.iter(|| store.reconcile())
        });

        group.bench_with_input(BenchmarkId::new("flush_creates", size), size, |b, &size| {
            b.iter(|| {
                let store = Store::new(config(), Arc::new(MemoryResource::new("id"))).unwrap();
                let collection = store.collection();
                for i in 0..size {
                    let mut record = user(i);
                    record.remove("id");
                    collection.push(record);
                }
                rt.block_on(store.flush())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_merge,
    bench_change_detection,
    bench_reconcile,
);
criterion_main!(benches);

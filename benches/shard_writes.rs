//! Benchmark for routed tenant writes
//!
//! Measures the write path through schema validation, tenant derivation,
//! directory lookup and the local shard store.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use tenant_store::{Class, Coordinator, DataType, NewObject};

const CLASS: &str = "MultiTenantClass";
const TENANTS: usize = 100;

fn setup(rt: &tokio::runtime::Runtime) -> Arc<Coordinator> {
    rt.block_on(async {
        let coordinator = Coordinator::single_node("node-1").unwrap();
        coordinator
            .create_class(
                Class::new(CLASS)
                    .with_property("tenantName", DataType::Text)
                    .with_property("title", DataType::Text)
                    .with_multi_tenancy("tenantName"),
            )
            .await
            .unwrap();
        let names: Vec<String> = (0..TENANTS).map(|i| format!("tenant-{:03}", i)).collect();
        coordinator.create_tenants(CLASS, &names).await.unwrap();
        coordinator
    })
}

fn bench_single_write(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = setup(&rt);

    let mut group = c.benchmark_group("shard_writes");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_single_object", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            counter += 1;
            let object = NewObject::new()
                .with_property("tenantName", format!("tenant-{:03}", counter % TENANTS))
                .with_property("title", "benchmark");
            rt.block_on(coordinator.write_object(CLASS, black_box(object)))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_concurrent_writes(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = setup(&rt);

    let mut group = c.benchmark_group("shard_writes");
    group.throughput(Throughput::Elements(100));

    group.bench_function("concurrent_100_writes", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let coordinator = coordinator.clone();
                    handles.push(tokio::spawn(async move {
                        let object = NewObject::new()
                            .with_property("tenantName", format!("tenant-{:03}", i % TENANTS));
                        coordinator.write_object(CLASS, object).await
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
        });
    });

    group.finish();
}

fn bench_cluster_status(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = setup(&rt);

    c.bench_function("cluster_status_100_shards", |b| {
        b.iter(|| rt.block_on(coordinator.cluster_status(black_box(Some(CLASS)))).unwrap());
    });
}

criterion_group!(
    benches,
    bench_single_write,
    bench_concurrent_writes,
    bench_cluster_status
);
criterion_main!(benches);

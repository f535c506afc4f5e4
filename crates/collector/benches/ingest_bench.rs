//! Ingest buffer and flush ordering throughput.

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use logship_collector::{DedupStrategy, InboundEvent, IngestBuffer, order_batch};

fn events(n: u64) -> Vec<InboundEvent> {
    (0..n)
        .map(|i| {
            InboundEvent::new(
                format!("/var/log/pods/ns_pod-{}_uid/app/0.bin.log", i % 16),
                Bytes::from(format!("payload-{i}-{}", "x".repeat(256))),
                1_700_000_000_000 + (n - i),
            )
        })
        .collect()
}

fn bench_append(c: &mut Criterion) {
    let batch = events(215);
    let mut group = c.benchmark_group("ingest_buffer_append");
    group.throughput(Throughput::Elements(batch.len() as u64));

    for strategy in [DedupStrategy::KeyOrContent, DedupStrategy::Key, DedupStrategy::Exact] {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, &strategy| {
                b.iter(|| {
                    let mut buffer = IngestBuffer::new(strategy);
                    for event in batch.iter().cloned() {
                        black_box(buffer.append(event));
                    }
                    buffer.drain_all()
                })
            },
        );
    }
    group.finish();
}

fn bench_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_batch");
    for size in [215u64, 2_150] {
        let batch = events(size);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| order_batch(black_box(batch.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append, bench_order);
criterion_main!(benches);

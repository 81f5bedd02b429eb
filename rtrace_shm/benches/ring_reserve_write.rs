//! Reserve/write/publish cost on the trace hot path

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rtrace_shm::{RingReader, RingStore};
use std::hint::black_box;

/// Steady-state writes into a full ring, so every reserve evicts
fn bench_reserve_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RingStore::create(dir.path().join("bench_ring"), 64 * 1024).unwrap();

    let mut group = c.benchmark_group("reserve_write");
    for size in [32usize, 128, 512, 4096] {
        let record = vec![0xAAu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| {
                let mut reservation = store.reserve(black_box(record.len()));
                reservation.write(&record[2..]);
                drop(reservation);
                store.data_available();
            });
        });
    }
    group.finish();
}

/// Snapshot copy of a full 64 KiB ring
fn bench_snapshot(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RingStore::create(dir.path().join("bench_snapshot"), 64 * 1024).unwrap();
    for _ in 0..1024 {
        let mut reservation = store.reserve(100);
        reservation.write(&[0x55; 98]);
    }
    let reader = RingReader::attach(store.path()).unwrap();

    c.bench_function("snapshot_64k", |b| {
        b.iter(|| black_box(reader.snapshot().unwrap().records().count()));
    });
}

criterion_group!(benches, bench_reserve_write, bench_snapshot);
criterion_main!(benches);

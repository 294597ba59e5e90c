use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowforge::random::Rng;
use std::hint::black_box;

fn bench_next_u64(c: &mut Criterion) {
    let mut rng = Rng::new(0xC0FF_EE00);
    c.bench_function("Rng::next_u64", |b| {
        b.iter(|| black_box(rng.next_u64()));
    });
}

fn bench_weighted_distribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rng::weighted_distribute");
    for k in [4usize, 16, 64, 256].iter() {
        group.throughput(Throughput::Elements(*k as u64));
        group.bench_with_input(BenchmarkId::from_parameter(k), k, |b, &k| {
            let mut rng = Rng::new(1);
            b.iter(|| black_box(rng.weighted_distribute(100_000, k, 64, 1500)));
        });
    }
    group.finish();
}

fn bench_for_flow_reseed(c: &mut Criterion) {
    c.bench_function("Rng::for_flow", |b| {
        b.iter(|| black_box(Rng::for_flow(0x1234_5678, black_box(42))));
    });
}

criterion_group!(benches, bench_next_u64, bench_weighted_distribute, bench_for_flow_reseed);
criterion_main!(benches);

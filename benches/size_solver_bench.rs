use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowforge::random::Rng;
use flowforge::sizesolver::{plan_packet_sizes, DEFAULT_SIZE_TABLE};
use std::hint::black_box;

fn bench_plan_packet_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_packet_sizes");
    for count in [1usize, 10, 100, 1_000].iter() {
        let byte_target = (*count as u64) * 400;
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut rng = Rng::new(99);
            b.iter(|| black_box(plan_packet_sizes(&mut rng, count, byte_target, DEFAULT_SIZE_TABLE)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan_packet_sizes);
criterion_main!(benches);

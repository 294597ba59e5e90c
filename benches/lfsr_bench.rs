use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowforge::addrgen::{Lfsr, MultiRangeGenerator, PrefixedGenerator};
use flowforge::random::Rng;
use std::hint::black_box;

fn bench_lfsr_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lfsr::next");
    for degree in [8u8, 32, 64, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(degree), degree, |b, &degree| {
            let mut rng = Rng::new(7);
            let mut lfsr = Lfsr::new(degree, &mut rng);
            b.iter(|| black_box(lfsr.next()));
        });
    }
    group.finish();
}

fn bench_prefixed_generator_next(c: &mut Criterion) {
    c.bench_function("PrefixedGenerator::next (/8 IPv4)", |b| {
        let mut rng = Rng::new(7);
        let mut gen = PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng);
        b.iter(|| black_box(gen.next()));
    });
}

fn bench_multi_range_generator_next(c: &mut Criterion) {
    c.bench_function("MultiRangeGenerator::next (4 ranges)", |b| {
        let mut rng = Rng::new(7);
        let ranges = vec![
            PrefixedGenerator::new(vec![10, 0, 0, 0], 8, &mut rng),
            PrefixedGenerator::new(vec![172, 16, 0, 0], 12, &mut rng),
            PrefixedGenerator::new(vec![192, 168, 0, 0], 16, &mut rng),
            PrefixedGenerator::new(vec![198, 18, 0, 0], 15, &mut rng),
        ];
        let mut multi = MultiRangeGenerator::new(ranges);
        b.iter(|| black_box(multi.next(&mut rng)));
    });
}

criterion_group!(benches, bench_lfsr_next, bench_prefixed_generator_next, bench_multi_range_generator_next);
criterion_main!(benches);

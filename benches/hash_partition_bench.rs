use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowforge::replay::ingest::{classify, direction_invariant_hash, partition};
use std::hint::black_box;

fn ipv4_udp_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let mut bytes = vec![0u8; 14 + 20 + 8];
    bytes[12] = 0x08;
    bytes[13] = 0x00;
    bytes[14] = 0x45;
    bytes[23] = 17;
    bytes[26..30].copy_from_slice(&src);
    bytes[30..34].copy_from_slice(&dst);
    bytes
}

fn bench_classify(c: &mut Criterion) {
    let frame = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
    c.bench_function("classify (Ethernet+IPv4+UDP)", |b| {
        b.iter(|| black_box(classify(black_box(&frame))));
    });
}

fn bench_direction_invariant_hash(c: &mut Criterion) {
    let frame = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
    let (l3, _) = classify(&frame);
    c.bench_function("direction_invariant_hash", |b| {
        b.iter(|| black_box(direction_invariant_hash(black_box(&frame), black_box(&l3))));
    });
}

fn bench_partition_across_queue_counts(c: &mut Criterion) {
    let frame = ipv4_udp_frame([10, 0, 0, 1], [10, 0, 0, 2]);
    let (l3, _) = classify(&frame);
    let hash = direction_invariant_hash(&frame, &l3);

    let mut group = c.benchmark_group("partition");
    for queue_count in [1usize, 4, 16, 64].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(queue_count), queue_count, |b, &queue_count| {
            b.iter(|| black_box(partition(black_box(hash), black_box(queue_count))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_classify, bench_direction_invariant_hash, bench_partition_across_queue_counts);
criterion_main!(benches);

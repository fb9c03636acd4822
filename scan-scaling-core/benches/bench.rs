use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use scan_scaling_core::partition;

/// Benchmark group for planning over many small chunks.
fn bench_partition(criterion: &mut Criterion) {
  // 100000 chunks with up to 10000 rows each, roughly the shape of a large skim split into
  // small files.
  const NUM_CHUNKS: usize = 100000;
  let mut rng = SmallRng::seed_from_u64(7);
  let counts: Vec<i64> = (0..NUM_CHUNKS).map(|_| rng.gen_range(0..10000)).collect();

  let mut group = criterion.benchmark_group("Partition plan");
  for n_partitions in [1, 16, 128, 4096] {
    group.bench_with_input(
      BenchmarkId::new("Cursor walk", n_partitions),
      &(&counts, n_partitions),
      |b, (counts, n_partitions)| b.iter(|| partition(counts, *n_partitions).unwrap()),
    );
  }
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);

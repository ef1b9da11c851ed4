//! 🏎️ How fast can we sort the mail?
//!
//! Grouping + chunking a drained batch, across a few folder spreads.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use enrichq::common::{Job, OwnerContext};
use enrichq::grouping::{group_and_chunk, split_oversized};

fn batch(jobs: usize, folders: usize) -> Vec<Job> {
    (0..jobs)
        .map(|i| {
            Job::new(
                format!("folder-{}", i % folders),
                OwnerContext::new(1, 1, 0),
                format!("item-{i}"),
                format!("rec-{i}"),
            )
        })
        .collect()
}

fn bench_group_and_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_and_chunk");
    for folders in [1usize, 16, 256] {
        let jobs = batch(10_000, folders);
        group.throughput(Throughput::Elements(jobs.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(folders), &jobs, |b, jobs| {
            b.iter(|| group_and_chunk(black_box(jobs.clone()), 50))
        });
    }
    group.finish();
}

fn bench_split_then_chunk(c: &mut Criterion) {
    let jobs = batch(10_000, 16);
    c.bench_function("split_oversized_then_chunk", |b| {
        b.iter(|| {
            split_oversized(black_box(jobs.clone()), 1000)
                .into_iter()
                .map(|sub| group_and_chunk(sub, 50).len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, bench_group_and_chunk, bench_split_then_chunk);
criterion_main!(benches);

//! Benchmarks bucket fill/drain and a steady-state alloc/free churn.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rdb_slab_alloc::SlabAllocator;

fn bench_bucket_fill_and_drain(c: &mut Criterion) {
    c.bench_function("bucket_fill_and_drain", |b| {
        b.iter(|| {
            std::thread::spawn(|| {
                let allocator = SlabAllocator::init();
                let mut ranges = Vec::with_capacity(50);
                for _ in 0..50 {
                    ranges.push(allocator.alloc(black_box(2000)).unwrap());
                }
                for r in ranges {
                    allocator.free(r);
                }
                allocator.deinit();
            })
            .join()
            .unwrap();
        });
    });
}

fn bench_steady_state_churn(c: &mut Criterion) {
    let allocator = SlabAllocator::init();
    c.bench_function("steady_state_alloc_free_64", |b| {
        b.iter(|| {
            let range = allocator.alloc(black_box(64)).unwrap();
            allocator.free(range);
        });
    });
    allocator.deinit();
}

criterion_group!(benches, bench_bucket_fill_and_drain, bench_steady_state_churn);
criterion_main!(benches);

//! Pool and heap benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eventum_common::collections::{BoundedQueue, PairingHeap};
use eventum_common::memory::ObjectPool;

fn pool_rent_benchmark(c: &mut Criterion) {
    let pool = ObjectPool::new("bench", 4, 16, || vec![0u8; 256]).unwrap();

    c.bench_function("pool_rent_return", |b| {
        b.iter(|| {
            let lease = pool.rent().unwrap();
            black_box(lease.len())
        })
    });
}

fn heap_add_delete_benchmark(c: &mut Criterion) {
    c.bench_function("pairing_heap_add_delete_1000", |b| {
        let mut heap = PairingHeap::new();
        b.iter(|| {
            for i in (0..1000u64).rev() {
                heap.add(i.wrapping_mul(2_654_435_761) % 10_007);
            }
            let mut sum = 0u64;
            while let Some(value) = heap.delete_min() {
                sum = sum.wrapping_add(value);
            }
            black_box(sum)
        })
    });
}

fn bounded_queue_benchmark(c: &mut Criterion) {
    c.bench_function("bounded_queue_enqueue_10000", |b| {
        b.iter(|| {
            let mut queue = BoundedQueue::new(128);
            for i in 0..10_000 {
                queue.enqueue(i);
            }
            black_box(queue.len())
        })
    });
}

criterion_group!(
    benches,
    pool_rent_benchmark,
    heap_add_delete_benchmark,
    bounded_queue_benchmark,
);
criterion_main!(benches);

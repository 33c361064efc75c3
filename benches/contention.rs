//! Push/pop throughput of every structure and reclamation strategy, both on a
//! single thread and under contention.

use std::thread;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use conquer_lockfree::queue::spsc;
use conquer_lockfree::{CountedQueue, CountedStack, Counting, HazardPointers, Queue, Reclaim, Stack};

const OPS_PER_THREAD: u64 = 1_000;
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

/// Runs `threads` threads, each performing `iters * OPS_PER_THREAD` push/pop
/// pairs through `op`, and returns the elapsed time.
fn contended(threads: usize, iters: u64, op: impl Fn(u64) + Sync) -> Duration {
    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..threads {
            let op = &op;
            s.spawn(move || op(iters * OPS_PER_THREAD));
        }
    });
    start.elapsed()
}

fn stack_pairs<R: Reclaim>(stack: &Stack<u64, R>, ops: u64) {
    let handle = stack.handle().unwrap();
    for i in 0..ops {
        handle.push(i);
        black_box(handle.pop());
    }
}

fn queue_pairs<R: Reclaim>(queue: &Queue<u64, R>, ops: u64) {
    let handle = queue.handle().unwrap();
    for i in 0..ops {
        handle.push(i);
        black_box(handle.pop());
    }
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");
    group.throughput(Throughput::Elements(1));

    let stack: Stack<u64, Counting> = Stack::new();
    let handle = stack.handle().unwrap();
    group.bench_function("stack/counting", |b| {
        b.iter(|| {
            handle.push(black_box(1));
            handle.pop()
        })
    });

    let stack: Stack<u64, HazardPointers> = Stack::new();
    let handle = stack.handle().unwrap();
    group.bench_function("stack/hazard", |b| {
        b.iter(|| {
            handle.push(black_box(1));
            handle.pop()
        })
    });

    let stack = CountedStack::new();
    group.bench_function("stack/split", |b| {
        b.iter(|| {
            stack.push(black_box(1u64));
            stack.pop()
        })
    });

    let queue: Queue<u64, Counting> = Queue::new();
    let handle = queue.handle().unwrap();
    group.bench_function("queue/counting", |b| {
        b.iter(|| {
            handle.push(black_box(1));
            handle.pop()
        })
    });

    let queue: Queue<u64, HazardPointers> = Queue::new();
    let handle = queue.handle().unwrap();
    group.bench_function("queue/hazard", |b| {
        b.iter(|| {
            handle.push(black_box(1));
            handle.pop()
        })
    });

    let queue = CountedQueue::new();
    group.bench_function("queue/split", |b| {
        b.iter(|| {
            queue.push(black_box(1u64));
            queue.pop()
        })
    });

    let (mut tx, mut rx) = spsc::channel();
    group.bench_function("queue/spsc", |b| {
        b.iter(|| {
            tx.push(black_box(1u64));
            rx.pop()
        })
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for &threads in THREAD_COUNTS {
        group.throughput(Throughput::Elements(threads as u64 * OPS_PER_THREAD));

        group.bench_function(BenchmarkId::new("stack/counting", threads), |b| {
            let stack: Stack<u64, Counting> = Stack::new();
            b.iter_custom(|iters| contended(threads, iters, |ops| stack_pairs(&stack, ops)))
        });

        group.bench_function(BenchmarkId::new("stack/hazard", threads), |b| {
            let stack: Stack<u64, HazardPointers> = Stack::new();
            b.iter_custom(|iters| contended(threads, iters, |ops| stack_pairs(&stack, ops)))
        });

        group.bench_function(BenchmarkId::new("stack/split", threads), |b| {
            let stack = CountedStack::new();
            b.iter_custom(|iters| {
                contended(threads, iters, |ops| {
                    for i in 0..ops {
                        stack.push(i);
                        black_box(stack.pop());
                    }
                })
            })
        });

        group.bench_function(BenchmarkId::new("queue/counting", threads), |b| {
            let queue: Queue<u64, Counting> = Queue::new();
            b.iter_custom(|iters| contended(threads, iters, |ops| queue_pairs(&queue, ops)))
        });

        group.bench_function(BenchmarkId::new("queue/hazard", threads), |b| {
            let queue: Queue<u64, HazardPointers> = Queue::new();
            b.iter_custom(|iters| contended(threads, iters, |ops| queue_pairs(&queue, ops)))
        });

        group.bench_function(BenchmarkId::new("queue/split", threads), |b| {
            let queue = CountedQueue::new();
            b.iter_custom(|iters| {
                contended(threads, iters, |ops| {
                    for i in 0..ops {
                        queue.push(i);
                        black_box(queue.pop());
                    }
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);

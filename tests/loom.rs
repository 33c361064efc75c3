//! Exhaustive interleaving checks for the split reference counted structures
//! and the single-producer/single-consumer queue.
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --test loom --release
//! ```

#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;

use conquer_lockfree::queue::spsc;
use conquer_lockfree::{CountedQueue, CountedStack};

/// The CAS retry loops only ever repeat after another thread made progress,
/// so bounding the number of preemptions bounds every execution.
const PREEMPTION_BOUND: usize = 3;

fn model<F>(f: F)
where
    F: Fn() + Sync + Send + 'static,
{
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(PREEMPTION_BOUND);
    builder.check(f);
}

#[test]
fn counted_stack_push_pop() {
    model(|| {
        let stack = Arc::new(CountedStack::new());
        stack.push(1);

        let s1 = Arc::clone(&stack);
        let t1 = thread::spawn(move || s1.pop());
        let s2 = Arc::clone(&stack);
        let t2 = thread::spawn(move || {
            s2.push(2);
            s2.pop()
        });

        let mut popped: Vec<_> =
            vec![t1.join().unwrap(), t2.join().unwrap()].into_iter().flatten().collect();
        popped.extend(stack.pop());
        popped.sort_unstable();
        assert_eq!(popped, vec![1, 2]);
        assert!(stack.is_empty());
    });
}

#[test]
fn counted_stack_concurrent_pops() {
    model(|| {
        let stack = Arc::new(CountedStack::new());
        stack.push(1);
        stack.push(2);

        let s1 = Arc::clone(&stack);
        let t1 = thread::spawn(move || s1.pop());
        let s2 = Arc::clone(&stack);
        let t2 = thread::spawn(move || s2.pop());

        let mut popped = vec![t1.join().unwrap().unwrap(), t2.join().unwrap().unwrap()];
        popped.sort_unstable();
        assert_eq!(popped, vec![1, 2]);
        assert_eq!(stack.pop(), None);
    });
}

#[test]
fn counted_queue_racing_producers() {
    model(|| {
        let queue = Arc::new(CountedQueue::new());

        let q1 = Arc::clone(&queue);
        let t1 = thread::spawn(move || q1.push(1));
        let q2 = Arc::clone(&queue);
        let t2 = thread::spawn(move || q2.push(2));

        t1.join().unwrap();
        t2.join().unwrap();

        let mut popped = vec![queue.pop().unwrap(), queue.pop().unwrap()];
        popped.sort_unstable();
        assert_eq!(popped, vec![1, 2]);
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    });
}

#[test]
fn counted_queue_push_pop() {
    model(|| {
        let queue = Arc::new(CountedQueue::new());
        queue.push(1);

        let q1 = Arc::clone(&queue);
        let consumer = thread::spawn(move || q1.pop());
        let q2 = Arc::clone(&queue);
        let producer = thread::spawn(move || q2.push(2));

        producer.join().unwrap();
        assert_eq!(consumer.join().unwrap(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    });
}

#[test]
fn spsc_in_order() {
    model(|| {
        let (mut tx, mut rx) = spsc::channel();

        let producer = thread::spawn(move || {
            tx.push(1);
            tx.push(2);
        });

        let mut popped = Vec::new();
        while popped.len() < 2 {
            match rx.pop() {
                Some(elem) => popped.push(elem),
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert_eq!(popped, vec![1, 2]);
        assert_eq!(rx.pop(), None);
    });
}

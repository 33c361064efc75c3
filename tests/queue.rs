#![cfg(not(loom))]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use conquer_lockfree::hazard::Config;
use conquer_lockfree::queue::spsc;
use conquer_lockfree::{CountedQueue, Counting, Error, HazardPointers, Queue, Reclaim};

struct DropCount<'a>(&'a AtomicUsize);

impl Drop for DropCount<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn fifo<R: Reclaim>() {
    let queue: Queue<i32, R> = Queue::new();
    let handle = queue.handle().unwrap();
    handle.push(1);
    handle.push(2);
    handle.push(3);

    assert_eq!(handle.pop(), Some(1));
    assert_eq!(handle.pop(), Some(2));
    assert_eq!(handle.pop(), Some(3));
    assert_eq!(handle.pop(), None);
    assert!(queue.is_empty());
}

#[test]
fn fifo_counting() {
    fifo::<Counting>();
}

#[test]
fn fifo_hazard_pointers() {
    fifo::<HazardPointers>();
}

#[test]
fn fifo_counted() {
    let queue = CountedQueue::new();
    queue.push(1);
    queue.push(2);
    queue.push(3);

    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), Some(3));
    assert_eq!(queue.pop(), None);
}

#[test]
fn fifo_spsc() {
    let (mut tx, mut rx) = spsc::channel();
    tx.push(1);
    tx.push(2);
    tx.push(3);

    assert_eq!(rx.pop(), Some(1));
    assert_eq!(rx.pop(), Some(2));
    assert_eq!(rx.pop(), Some(3));
    assert_eq!(rx.pop(), None);
}

#[test]
fn hazard_handles_bounded() {
    let reclaimer = HazardPointers::with_config(Config::with_capacity(2));
    let queue: Queue<i32, _> = Queue::with_reclaimer(reclaimer);
    let first = queue.handle().unwrap();
    let second = queue.handle().unwrap();
    assert_eq!(queue.handle().unwrap_err(), Error::ResourceExhausted { capacity: 2 });

    first.push(1);
    assert_eq!(second.pop(), Some(1));
}

#[test]
fn racing_producers() {
    for _ in 0..100 {
        let queue: Queue<usize, HazardPointers> = Queue::new();
        let counted = CountedQueue::new();
        thread::scope(|s| {
            for id in 0..2 {
                let (queue, counted) = (&queue, &counted);
                s.spawn(move || {
                    queue.handle().unwrap().push(id);
                    counted.push(id);
                });
            }
        });

        let handle = queue.handle().unwrap();
        let mut popped = vec![handle.pop().unwrap(), handle.pop().unwrap()];
        popped.sort_unstable();
        assert_eq!(popped, vec![0, 1]);
        assert_eq!(handle.pop(), None);
        assert!(queue.is_empty());

        let mut popped = vec![counted.pop().unwrap(), counted.pop().unwrap()];
        popped.sort_unstable();
        assert_eq!(popped, vec![0, 1]);
        assert!(counted.is_empty());
    }
}

#[test]
fn spsc_across_threads() {
    const COUNT: usize = 100_000;

    let (mut tx, mut rx) = spsc::channel();
    thread::scope(|s| {
        s.spawn(move || {
            for i in 0..COUNT {
                tx.push(i);
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            if let Some(elem) = rx.pop() {
                assert_eq!(elem, expected);
                expected += 1;
            }
        }
    });
}

#[test]
fn every_payload_dropped_once() {
    let counter = AtomicUsize::new(0);
    {
        let queue: Queue<_, HazardPointers> = Queue::new();
        let counted = CountedQueue::new();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let handle = queue.handle().unwrap();
                    for _ in 0..500 {
                        handle.push(DropCount(&counter));
                        counted.push(DropCount(&counter));
                    }
                    for _ in 0..250 {
                        drop(handle.pop());
                        drop(counted.pop());
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 2_000);
        let stats = queue.reclaimer().stats();
        assert_eq!(stats.retired, 1_000);
    }

    assert_eq!(counter.load(Ordering::Relaxed), 4_000);
}

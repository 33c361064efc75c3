//! A lock-free queue for exactly one producer and one consumer.
//!
//! The producer only ever writes to the tail node and the consumer only ever
//! reads nodes before it, so neither side needs a *compare-and-swap* and
//! popped nodes can be freed right away.
//!
//! # Example
//!
//! ```
//! use conquer_lockfree::queue::spsc;
//!
//! let (mut tx, mut rx) = spsc::channel();
//! let producer = std::thread::spawn(move || {
//!     for i in 0..100 {
//!         tx.push(i);
//!     }
//! });
//!
//! producer.join().unwrap();
//! assert_eq!((0..100).map(|_| rx.pop().unwrap()).sum::<i32>(), 4950);
//! assert_eq!(rx.pop(), None);
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::sync::{Arc, AtomicPtr};

/// Creates a new empty queue and returns its two halves.
#[inline]
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner::new());
    (Producer { inner: Arc::clone(&inner) }, Consumer { inner })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Producer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The sending half of a single-producer/single-consumer queue.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
}

/********** impl inherent *************************************************************************/

impl<T> Producer<T> {
    /// Pushes `elem` to the back of the queue.
    #[inline]
    pub fn push(&mut self, elem: T) {
        let node = Box::into_raw(Box::new(Node::empty()));
        let tail = self.inner.tail.load(Relaxed);
        unsafe {
            (*tail).elem = Some(elem);
            (*tail).next = node;
        }

        self.inner.tail.store(node, Release);
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for Producer<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Producer").finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Consumer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The receiving half of a single-producer/single-consumer queue.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

/********** impl inherent *************************************************************************/

impl<T> Consumer<T> {
    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.head.load(Relaxed) == self.inner.tail.load(Acquire)
    }

    /// Pops the element from the front of the queue or returns [`None`] if the
    /// queue is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let head = self.inner.head.load(Relaxed);
        if head == self.inner.tail.load(Acquire) {
            return None;
        }

        let mut node = unsafe { Box::from_raw(head) };
        self.inner.head.store(node.next, Relaxed);
        node.elem.take()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for Consumer<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Consumer").finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Inner
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Inner<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    _marker: PhantomData<T>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/********** impl inherent *************************************************************************/

impl<T> Inner<T> {
    #[inline]
    fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(Node::empty()));
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            _marker: PhantomData,
        }
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut curr = self.head.load(Relaxed);
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T> {
    elem: Option<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    #[inline]
    fn empty() -> Self {
        Self { elem: None, next: ptr::null_mut() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::channel;

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn push_pop() {
        let (mut tx, mut rx) = channel();
        assert!(rx.is_empty());
        assert_eq!(rx.pop(), None);

        tx.push(1);
        tx.push(2);
        tx.push(3);
        assert!(!rx.is_empty());
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn drop_remaining() {
        let counter = AtomicUsize::new(0);
        let (mut tx, mut rx) = channel();
        for _ in 0..3 {
            tx.push(DropCount(&counter));
        }

        drop(rx.pop());
        drop(tx);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(rx);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}

//! A lock-free queue using split reference counting for reclamation.
//!
//! Both head and tail carry an external count, so every node starts out with
//! two external counters.
//! A node is freed once the head and the tail have both moved past it and
//! all threads that were still reading it have released their references.

use core::fmt;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

use crate::counted::{AtomicCountedPtr, CountedPtr};
use crate::split::{self, AtomicNodeCounter, CountedNode};
use crate::sync::AtomicPtr;

////////////////////////////////////////////////////////////////////////////////////////////////////
// CountedQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A concurrent unbounded lock-free multi-producer/multi-consumer FIFO queue
/// whose nodes are reclaimed through split reference counts.
///
/// # Example
///
/// ```
/// use conquer_lockfree::CountedQueue;
///
/// let queue = CountedQueue::new();
/// queue.push(1);
/// queue.push(2);
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct CountedQueue<T> {
    head: AtomicCountedPtr<Node<T>>,
    tail: AtomicCountedPtr<Node<T>>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send> Send for CountedQueue<T> {}
unsafe impl<T: Send> Sync for CountedQueue<T> {}

/********** impl inherent *************************************************************************/

impl<T> CountedQueue<T> {
    /// Creates a new empty queue.
    #[inline]
    pub fn new() -> Self {
        let sentinel = CountedPtr::new(Box::into_raw(Box::new(Node::empty())), 1);
        Self { head: AtomicCountedPtr::new(sentinel), tail: AtomicCountedPtr::new(sentinel) }
    }

    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Acquire).ptr() == self.tail.load(Acquire).ptr()
    }

    /// Pushes `elem` to the back of the queue.
    pub fn push(&self, elem: T) {
        let elem = Box::into_raw(Box::new(elem));
        let mut spare = ptr::null_mut();
        let mut old_tail = self.tail.load(Relaxed);
        loop {
            split::increase_external_count(&self.tail, &mut old_tail);
            let tail = old_tail.ptr();
            unsafe {
                let claimed =
                    (*tail).elem.compare_exchange(ptr::null_mut(), elem, AcqRel, Acquire).is_ok();
                let next = Self::link_successor(tail, &mut spare);
                self.set_new_tail(&mut old_tail, next);
                if claimed {
                    if !spare.is_null() {
                        drop(Box::from_raw(spare));
                    }

                    return;
                }
            }
        }
    }

    /// Pops the element from the front of the queue or returns [`None`] if the
    /// queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut old_head = self.head.load(Relaxed);
        loop {
            split::increase_external_count(&self.head, &mut old_head);
            let ptr = old_head.ptr();
            unsafe {
                if ptr == self.tail.load(Acquire).ptr() {
                    if !split::undo_increase(&self.head, old_head) {
                        split::release_ref(ptr);
                    }

                    return None;
                }

                let next = (*ptr).next.load(Acquire);
                match self.head.compare_exchange(old_head, next, AcqRel, Acquire) {
                    Ok(_) => {
                        // the slot stays claimed, a stale producer must
                        // never be able to write into a popped node
                        let elem = (*ptr).elem.load(Acquire);
                        split::free_external_counter(old_head);
                        return Some(*Box::from_raw(elem));
                    }
                    Err(actual) => {
                        split::release_ref(ptr);
                        old_head = actual;
                    }
                }
            }
        }
    }

    /// Returns the successor of `tail`, which is linked first if necessary.
    ///
    /// `spare` is allocated lazily and reset to `null` once it is linked.
    #[inline]
    unsafe fn link_successor(
        tail: *mut Node<T>,
        spare: &mut *mut Node<T>,
    ) -> CountedPtr<Node<T>> {
        let next = (*tail).next.load(Acquire);
        if !next.is_null() {
            return next;
        }

        if spare.is_null() {
            *spare = Box::into_raw(Box::new(Node::empty()));
        }

        let new = CountedPtr::new(*spare, 1);
        match (*tail).next.compare_exchange(CountedPtr::null(), new, AcqRel, Acquire) {
            Ok(_) => {
                *spare = ptr::null_mut();
                new
            }
            Err(actual) => actual,
        }
    }

    /// Swings the tail from `old_tail` to `new_tail` and gives up the calling
    /// thread's reference to the previous tail node.
    ///
    /// If another thread has already advanced the tail, only the reference is
    /// released.
    #[inline]
    unsafe fn set_new_tail(
        &self,
        old_tail: &mut CountedPtr<Node<T>>,
        new_tail: CountedPtr<Node<T>>,
    ) {
        let current = old_tail.ptr();
        while let Err(actual) =
            self.tail.compare_exchange_weak(*old_tail, new_tail, AcqRel, Acquire)
        {
            *old_tail = actual;
            if actual.ptr() != current {
                break;
            }
        }

        if old_tail.ptr() == current {
            split::free_external_counter(*old_tail);
        } else {
            split::release_ref(current);
        }
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for CountedQueue<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for CountedQueue<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CountedQueue").field("head", &self.head).field("tail", &self.tail).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for CountedQueue<T> {
    fn drop(&mut self) {
        let mut curr = self.head.load(Relaxed).ptr();
        while !curr.is_null() {
            unsafe {
                let node = Box::from_raw(curr);
                let elem = node.elem.load(Relaxed);
                if !elem.is_null() {
                    drop(Box::from_raw(elem));
                }

                curr = node.next.load(Relaxed).ptr();
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T> {
    elem: AtomicPtr<T>,
    counter: AtomicNodeCounter,
    next: AtomicCountedPtr<Node<T>>,
}

/********** impl inherent *************************************************************************/

impl<T> Node<T> {
    #[inline]
    fn empty() -> Self {
        Self {
            elem: AtomicPtr::new(ptr::null_mut()),
            counter: AtomicNodeCounter::new(2),
            next: AtomicCountedPtr::null(),
        }
    }
}

/********** impl CountedNode **********************************************************************/

unsafe impl<T> CountedNode for Node<T> {
    #[inline]
    fn counter(&self) -> &AtomicNodeCounter {
        &self.counter
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::CountedQueue;

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn push_pop() {
        let queue = CountedQueue::new();
        assert!(queue.is_empty());
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert!(!queue.is_empty());
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn empty_pop_undoes_increment() {
        let queue = CountedQueue::<i32>::new();
        for _ in 0..1_000 {
            assert_eq!(queue.pop(), None);
        }
        assert_eq!(queue.head.load(Ordering::Relaxed).count(), 1);

        queue.push(1);
        assert_eq!(queue.pop(), Some(1));
    }

    #[test]
    fn help_stalled_producer() {
        let queue = CountedQueue::new();

        // a producer claims the sentinel's slot and stalls before it links a
        // successor or advances the tail
        let sentinel = queue.tail.load(Ordering::Relaxed).ptr();
        let elem = Box::into_raw(Box::new(1));
        let claim = unsafe { &(*sentinel).elem }.compare_exchange(
            ptr::null_mut(),
            elem,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(claim.is_ok());

        queue.push(2);
        let tail = queue.tail.load(Ordering::Relaxed);
        assert_ne!(tail.ptr(), sentinel);
        assert_eq!(tail.count(), 1);
        assert!(unsafe { (*tail.ptr()).elem.load(Ordering::Relaxed) }.is_null());

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn drop_remaining() {
        let counter = AtomicUsize::new(0);
        let queue = CountedQueue::new();
        for _ in 0..4 {
            queue.push(DropCount(&counter));
        }

        drop(queue.pop());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(queue);
        assert_eq!(counter.load(Ordering::Relaxed), 4);
    }
}

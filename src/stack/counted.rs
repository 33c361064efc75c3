//! A lock-free stack using split reference counting for reclamation.
//!
//! The head pointer carries an external count, which every popping thread
//! increments before de-referencing the node.
//! The thread that unlinks a node folds the external count into the node's
//! internal count, every other thread releases its reference by decrementing
//! the internal count.
//! The node is freed by whichever thread brings both counts to zero.
//!
//! # Example
//!
//! ```
//! use conquer_lockfree::CountedStack;
//!
//! let stack = CountedStack::new();
//! stack.push(1);
//! stack.push(2);
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```

use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::Ordering::{Relaxed, Release};

use crate::counted::{AtomicCountedPtr, CountedPtr};
use crate::split::{self, AtomicNodeCounter, CountedNode};

////////////////////////////////////////////////////////////////////////////////////////////////////
// CountedStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free LIFO stack whose nodes are reclaimed through split reference
/// counts.
///
/// Unlike [`Stack`](crate::Stack), the stack requires no thread-local handle.
pub struct CountedStack<T> {
    head: AtomicCountedPtr<Node<T>>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send> Send for CountedStack<T> {}
unsafe impl<T: Send> Sync for CountedStack<T> {}

/********** impl inherent *************************************************************************/

impl<T> CountedStack<T> {
    /// Creates a new empty stack.
    #[inline]
    pub fn new() -> Self {
        Self { head: AtomicCountedPtr::null() }
    }

    /// Returns `true` if the stack is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Relaxed).is_null()
    }

    /// Pushes `elem` to the top of the stack.
    ///
    /// The displaced head is re-linked with a fresh external counter, so that
    /// the count accumulated in the head pointer is folded into the node and
    /// does not travel on with it.
    #[inline]
    pub fn push(&self, elem: T) {
        let node = Box::into_raw(Box::new(Node::new(elem)));
        let new = CountedPtr::new(node, 1);
        let mut head = self.head.load(Relaxed);
        loop {
            split::increase_external_count(&self.head, &mut head);
            let top = head.ptr();
            unsafe {
                // the node is not yet shared, so its link can be written freely
                (*node).next = if top.is_null() {
                    CountedPtr::null()
                } else {
                    (*top).counter.add_external_counter();
                    head.with_count(1)
                };

                match self.head.compare_exchange(head, new, Release, Relaxed) {
                    Ok(_) => {
                        if !top.is_null() {
                            split::free_external_counter(head);
                        }

                        return;
                    }
                    Err(actual) => {
                        if !top.is_null() {
                            split::discard_external_counter(top);
                        }

                        head = actual;
                    }
                }
            }
        }
    }

    /// Pops the element from the top of the stack or returns [`None`] if the
    /// stack is empty.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let mut old = self.head.load(Relaxed);
        loop {
            split::increase_external_count(&self.head, &mut old);
            if old.is_null() {
                return None;
            }

            let ptr = old.ptr();
            let next = unsafe { (*ptr).next };
            match self.head.compare_exchange(old, next, Relaxed, Relaxed) {
                Ok(_) => unsafe {
                    let elem = ptr::read(&*(*ptr).elem);
                    split::free_external_counter(old);
                    return Some(elem);
                },
                Err(actual) => {
                    unsafe { split::release_ref(ptr) };
                    old = actual;
                }
            }
        }
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for CountedStack<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for CountedStack<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CountedStack").field("head", &self.head).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for CountedStack<T> {
    #[inline]
    fn drop(&mut self) {
        drop(IntoIter { curr: self.head.load(Relaxed) });
    }
}

/********** impl IntoIterator *********************************************************************/

impl<T> IntoIterator for CountedStack<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        let curr = self.head.load(Relaxed);
        self.head.store(CountedPtr::null(), Relaxed);
        IntoIter { curr }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// IntoIter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An owning iterator over the elements of a [`CountedStack`], from top to
/// bottom.
pub struct IntoIter<T> {
    curr: CountedPtr<Node<T>>,
}

/********** impl Send *****************************************************************************/

unsafe impl<T: Send> Send for IntoIter<T> {}

/********** impl Iterator *************************************************************************/

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.curr.is_null() {
            return None;
        }

        let node = unsafe { Box::from_raw(self.curr.ptr()) };
        self.curr = node.next;
        Some(ManuallyDrop::into_inner(node.elem))
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for IntoIter<T> {
    #[inline]
    fn drop(&mut self) {
        while self.next().is_some() {}
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T> {
    elem: ManuallyDrop<T>,
    counter: AtomicNodeCounter,
    next: CountedPtr<Node<T>>,
}

/********** impl inherent *************************************************************************/

impl<T> Node<T> {
    #[inline]
    fn new(elem: T) -> Self {
        Self {
            elem: ManuallyDrop::new(elem),
            counter: AtomicNodeCounter::new(1),
            next: CountedPtr::null(),
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::CountedStack;
    use crate::split;

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn push_pop() {
        let stack = CountedStack::new();
        stack.push(5);
        stack.push(8);
        stack.push(10);
        assert_eq!(stack.pop(), Some(10));
        assert_eq!(stack.pop(), Some(8));
        assert_eq!(stack.into_iter().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn empty_pop_leaves_no_count() {
        let stack = CountedStack::<i32>::new();
        for _ in 0..10 {
            assert_eq!(stack.pop(), None);
        }
        assert_eq!(stack.head.load(Ordering::Relaxed).count(), 0);
        assert!(stack.is_empty());
    }

    #[test]
    fn displaced_head_count_stays_bounded() {
        let stack = CountedStack::new();
        stack.push(u32::MAX);
        for i in 0..(u32::from(u16::MAX) + 5_000) {
            // a popper takes a reference to the top node, but a push lands
            // on top of it before its CAS
            let mut old = stack.head.load(Ordering::Relaxed);
            split::increase_external_count(&stack.head, &mut old);
            stack.push(i);

            let next = unsafe { (*old.ptr()).next };
            let res = stack.head.compare_exchange(old, next, Ordering::Relaxed, Ordering::Relaxed);
            assert!(res.is_err());
            unsafe { split::release_ref(old.ptr()) };

            assert_eq!(stack.pop(), Some(i));
            assert_eq!(stack.head.load(Ordering::Relaxed).count(), 1);
        }

        let base = stack.head.load(Ordering::Relaxed).ptr();
        assert_eq!(unsafe { (*base).counter.load() }, (0, 1));
        assert_eq!(stack.pop(), Some(u32::MAX));
        assert!(stack.is_empty());
    }

    #[test]
    fn drop_remaining() {
        let counter = AtomicUsize::new(0);
        let stack = CountedStack::new();
        for _ in 0..4 {
            stack.push(DropCount(&counter));
        }

        drop(stack.pop());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(stack);
        assert_eq!(counter.load(Ordering::Relaxed), 4);
    }
}

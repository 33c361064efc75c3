//! A Treiber stack generic over the [`Reclaim`] mechanism.
//!
//! # Example
//!
//! ```
//! use conquer_lockfree::{Counting, Stack};
//!
//! let stack: Stack<_, Counting> = Stack::new();
//! stack.push(5);
//! stack.push(8);
//! stack.push(10);
//!
//! let handle = stack.handle().unwrap();
//! assert_eq!(handle.pop(), Some(10));
//! assert_eq!(handle.pop(), Some(8));
//!
//! drop(handle);
//! assert_eq!(stack.into_iter().collect::<Vec<_>>(), vec![5]);
//! ```

pub mod counted;

use core::fmt;
use core::iter::FromIterator;
use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::Ordering::{self, Acquire, Relaxed, Release};

use crate::atomic::Atomic;
use crate::error::Error;
use crate::traits::{LocalState, Protect, Reclaim};
use crate::Owned;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Stack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free LIFO stack.
///
/// Pushing requires no reclamation state and can be done directly through the
/// stack.
/// Popping requires a [`StackRef`] handle, which carries the calling thread's
/// reclamation state.
pub struct Stack<T, R: Reclaim> {
    head: Atomic<Node<T, R>, R>,
    reclaimer: R,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send, R: Reclaim> Send for Stack<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for Stack<T, R> {}

/********** impl inherent *************************************************************************/

impl<T, R: Reclaim> Stack<T, R> {
    const RELEASE_CAS: (Ordering, Ordering) = (Release, Relaxed);

    /// Creates a new empty stack with a default constructed reclaimer.
    #[inline]
    pub fn new() -> Self {
        Self::with_reclaimer(R::default())
    }

    /// Creates a new empty stack using the given `reclaimer`.
    #[inline]
    pub fn with_reclaimer(reclaimer: R) -> Self {
        Self { head: Atomic::null(), reclaimer }
    }

    /// Returns a reference to the stack's reclaimer.
    #[inline]
    pub fn reclaimer(&self) -> &R {
        &self.reclaimer
    }

    /// Creates a new handle to the stack for the calling thread.
    ///
    /// # Errors
    ///
    /// Fails, if the reclaimer can not provide any more thread-local state.
    #[inline]
    pub fn handle(&self) -> Result<StackRef<'_, T, R>, Error> {
        StackRef::new(self)
    }

    /// Returns `true` if the stack is empty.
    ///
    /// The result is only a snapshot and may already be outdated when it is
    /// returned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load_raw(Relaxed).is_null()
    }

    /// Pushes `elem` to the top of the stack.
    #[inline]
    pub fn push(&self, elem: T) {
        let mut node = Owned::new(Node::new(elem));
        loop {
            let head = self.head.load_unprotected(Relaxed);
            // the store only becomes visible if the subsequent CAS succeeds
            node.next.store(head, Relaxed);
            let (success, failure) = Self::RELEASE_CAS;
            match self.head.compare_exchange_weak(head, node, success, failure) {
                Ok(_) => return,
                Err(err) => node = err.input,
            }
        }
    }

    /// Pops the element from the top of the stack or returns [`None`] if the
    /// stack is empty.
    ///
    /// # Safety
    ///
    /// `local_state` must have been built by this stack's reclaimer.
    #[inline]
    pub unsafe fn pop_unchecked(&self, local_state: &R::LocalState) -> Option<T> {
        let mut guard = local_state.build_guard();
        while let Some(shared) = self.head.load(&mut guard, Acquire) {
            // `next` is only ever stored if the CAS succeeds, in which case the
            // protected node can not have been popped in between
            let next = shared.next.load_unprotected(Relaxed);
            if let Ok(unlinked) = self.head.compare_exchange_weak(shared, next, Release, Relaxed) {
                let elem = unlinked.take(|node| &node.elem);
                guard.release();
                local_state.retire_record(unlinked.into_retired());
                return Some(elem);
            }
        }

        None
    }
}

/********** impl Default **************************************************************************/

impl<T, R: Reclaim> Default for Stack<T, R> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R: Reclaim + fmt::Debug> fmt::Debug for Stack<T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stack")
            .field("head", &self.head)
            .field("reclaimer", &self.reclaimer)
            .finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T, R: Reclaim> Drop for Stack<T, R> {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            let mut curr = self.head.take();
            while let Some(mut node) = curr {
                ManuallyDrop::drop(&mut node.elem);
                curr = node.next.take();
            }
        }
    }
}

/********** impl IntoIterator *********************************************************************/

impl<T, R: Reclaim> IntoIterator for Stack<T, R> {
    type Item = T;
    type IntoIter = IntoIter<T, R>;

    #[inline]
    fn into_iter(mut self) -> Self::IntoIter {
        IntoIter { curr: unsafe { self.head.take() } }
    }
}

/********** impl FromIterator *********************************************************************/

impl<T, R: Reclaim> FromIterator<T> for Stack<T, R> {
    /// Creates a stack with the last yielded element on top.
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let stack = Self::new();
        for elem in iter {
            let node = Owned::new(Node::new(elem));
            node.next.store(stack.head.load_unprotected(Relaxed), Relaxed);
            stack.head.store(node, Relaxed);
        }

        stack
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// StackRef
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A thread-local handle to a [`Stack`].
pub struct StackRef<'s, T, R: Reclaim> {
    stack: &'s Stack<T, R>,
    local_state: R::LocalState,
}

/********** impl inherent *************************************************************************/

impl<'s, T, R: Reclaim> StackRef<'s, T, R> {
    /// Creates a new handle to `stack`.
    ///
    /// # Errors
    ///
    /// Fails, if the reclaimer can not provide any more thread-local state.
    #[inline]
    pub fn new(stack: &'s Stack<T, R>) -> Result<Self, Error> {
        let local_state = unsafe { stack.reclaimer.build_local_state()? };
        Ok(Self { stack, local_state })
    }

    /// Pushes `elem` to the top of the stack.
    #[inline]
    pub fn push(&self, elem: T) {
        self.stack.push(elem);
    }

    /// Pops the element from the top of the stack or returns [`None`] if the
    /// stack is empty.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        unsafe { self.stack.pop_unchecked(&self.local_state) }
    }

    /// Attempts to reclaim records popped from the stack that are no longer
    /// in use.
    #[inline]
    pub fn reclaim(&self) {
        self.local_state.try_reclaim();
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R: Reclaim> fmt::Debug for StackRef<'_, T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StackRef").field("stack", &(self.stack as *const _)).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// IntoIter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An owning iterator over the elements of a [`Stack`], from top to bottom.
pub struct IntoIter<T, R: Reclaim> {
    curr: Option<Owned<Node<T, R>, R>>,
}

/********** impl Iterator *************************************************************************/

impl<T, R: Reclaim> Iterator for IntoIter<T, R> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.curr.take().map(|mut node| unsafe {
            let elem = ptr::read(&*node.elem);
            self.curr = node.next.take();
            elem
        })
    }
}

/********** impl Drop *****************************************************************************/

impl<T, R: Reclaim> Drop for IntoIter<T, R> {
    #[inline]
    fn drop(&mut self) {
        while self.next().is_some() {}
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T, R> {
    /// The node's element, which is only ever dropped as part of a node when a
    /// non-empty [`Stack`] itself is dropped.
    elem: ManuallyDrop<T>,
    next: Atomic<Self, R>,
}

/********** impl inherent *************************************************************************/

impl<T, R> Node<T, R> {
    #[inline]
    fn new(elem: T) -> Self {
        Self { elem: ManuallyDrop::new(elem), next: Atomic::null() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::Stack;
    use crate::counting::Counting;
    use crate::hazard::HazardPointers;
    use crate::traits::Reclaim;

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn push_pop<R: Reclaim>() {
        let stack: Stack<i32, R> = Stack::new();
        let handle = stack.handle().unwrap();
        assert!(stack.is_empty());
        assert_eq!(handle.pop(), None);

        handle.push(5);
        handle.push(8);
        handle.push(10);
        assert_eq!(handle.pop(), Some(10));
        assert_eq!(handle.pop(), Some(8));
        assert!(!stack.is_empty());
        assert_eq!(handle.pop(), Some(5));
        assert_eq!(handle.pop(), None);

        handle.reclaim();
        let stats = stack.reclaimer().stats();
        assert_eq!(stats.retired, 3);
        assert_eq!(stats.reclaimed, 3);
    }

    #[test]
    fn push_pop_counting() {
        push_pop::<Counting>();
    }

    #[test]
    fn push_pop_hazard() {
        push_pop::<HazardPointers>();
    }

    #[test]
    fn drop_remaining() {
        let counter = AtomicUsize::new(0);
        let stack: Stack<_, HazardPointers> = Stack::new();
        for _ in 0..5 {
            stack.push(DropCount(&counter));
        }

        let handle = stack.handle().unwrap();
        drop(handle.pop());
        drop(handle.pop());
        drop(handle);
        assert_eq!(counter.load(Ordering::Relaxed), 2);

        drop(stack);
        assert_eq!(counter.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn from_iter() {
        let stack: Stack<_, Counting> = (0..4).collect();
        let handle = stack.handle().unwrap();
        assert_eq!(handle.pop(), Some(3));
        drop(handle);
        assert_eq!(stack.into_iter().collect::<Vec<_>>(), vec![2, 1, 0]);
    }

    #[test]
    fn into_iter_partial() {
        let counter = AtomicUsize::new(0);
        let stack: Stack<_, Counting> = (0..3).map(|_| DropCount(&counter)).collect();
        let mut iter = stack.into_iter();
        drop(iter.next());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(iter);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}

//! Lock-free FIFO queues.
//!
//! [`Queue`] is generic over the [`Reclaim`] mechanism, [`CountedQueue`]
//! reclaims its nodes through split reference counts and the [`spsc`] module
//! contains a queue for exactly one producer and one consumer.
//!
//! The multi-producer queues share the same basic protocol: the tail node is
//! always an empty sentinel, whose payload slot is claimed by a producer with
//! a single *compare-and-swap*.
//! Only the winner of that race goes on to insert its element, but any
//! producer that loses it helps the winner by linking a successor node and
//! advancing the tail, so the tail can never be held back by a stalled
//! producer.
//!
//! [`CountedQueue`]: counted::CountedQueue

pub mod counted;
pub mod spsc;

use core::fmt;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crate::atomic::Atomic;
use crate::error::Error;
use crate::sync::AtomicPtr;
use crate::traits::{LocalState, Protect, Reclaim};
use crate::{Owned, Shared, Unprotected};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Queue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A concurrent unbounded lock-free multi-producer/multi-consumer FIFO queue.
///
/// # Example
///
/// ```
/// use conquer_lockfree::{HazardPointers, Queue};
///
/// let queue: Queue<_, HazardPointers> = Queue::new();
/// let handle = queue.handle().unwrap();
///
/// handle.push(1);
/// handle.push(2);
/// handle.push(3);
///
/// assert_eq!(handle.pop(), Some(1));
/// assert_eq!(handle.pop(), Some(2));
/// assert_eq!(handle.pop(), Some(3));
/// assert_eq!(handle.pop(), None);
/// ```
pub struct Queue<T, R: Reclaim> {
    head: Atomic<Node<T, R>, R>,
    tail: Atomic<Node<T, R>, R>,
    reclaimer: R,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send, R: Reclaim> Send for Queue<T, R> {}
unsafe impl<T: Send, R: Reclaim> Sync for Queue<T, R> {}

/********** impl inherent *************************************************************************/

impl<T, R: Reclaim> Queue<T, R> {
    /// Creates a new empty queue with a default constructed reclaimer.
    #[inline]
    pub fn new() -> Self {
        Self::with_reclaimer(R::default())
    }

    /// Creates a new empty queue using the given `reclaimer`.
    #[inline]
    pub fn with_reclaimer(reclaimer: R) -> Self {
        let sentinel = Owned::leak(Owned::<_, R>::new(Node::empty())).as_ptr();
        unsafe {
            Self { head: Atomic::from_raw(sentinel), tail: Atomic::from_raw(sentinel), reclaimer }
        }
    }

    /// Returns a reference to the queue's reclaimer.
    #[inline]
    pub fn reclaimer(&self) -> &R {
        &self.reclaimer
    }

    /// Creates a new handle to the queue for the calling thread.
    ///
    /// # Errors
    ///
    /// Fails, if the reclaimer can not provide any more thread-local state.
    #[inline]
    pub fn handle(&self) -> Result<QueueRef<'_, T, R>, Error> {
        QueueRef::new(self)
    }

    /// Returns `true` if the queue is empty.
    ///
    /// The result is only a snapshot and may already be outdated when it is
    /// returned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load_raw(Acquire) == self.tail.load_raw(Acquire)
    }

    /// Pushes `elem` to the back of the queue.
    ///
    /// # Safety
    ///
    /// `local_state` must have been built by this queue's reclaimer.
    #[inline]
    pub unsafe fn push_unchecked(&self, elem: T, local_state: &R::LocalState) {
        let elem = Box::into_raw(Box::new(elem));
        let mut spare = None;
        let mut guard = local_state.build_guard();
        loop {
            let tail = protect_non_null(&self.tail, &mut guard);
            let claimed =
                tail.elem.compare_exchange(ptr::null_mut(), elem, AcqRel, Acquire).is_ok();
            // whether the slot was claimed by this thread or by another one,
            // the tail has to be advanced before the next attempt
            let next = Self::link_successor(tail, &mut spare);
            let _ = self.tail.compare_exchange(tail.as_unprotected(), next, Release, Relaxed);
            if claimed {
                return;
            }
        }
    }

    /// Pops the element from the front of the queue or returns [`None`] if the
    /// queue is empty.
    ///
    /// # Safety
    ///
    /// `local_state` must have been built by this queue's reclaimer.
    #[inline]
    pub unsafe fn pop_unchecked(&self, local_state: &R::LocalState) -> Option<T> {
        let mut guard = local_state.build_guard();
        loop {
            let head = protect_non_null(&self.head, &mut guard);
            if head.as_ptr() == self.tail.load_raw(Acquire) {
                return None;
            }

            // the tail is past the head, so its successor must be linked
            let next = head.next.load_unprotected(Acquire);
            debug_assert!(!next.is_null(), "tail advanced past an unlinked node");
            if let Ok(unlinked) = self.head.compare_exchange(head, next, Release, Relaxed) {
                // the payload slot is left as it is, so that stale producers
                // can never claim it again
                let elem = unlinked.as_ref().elem.load(Acquire);
                guard.release();
                local_state.retire_record(unlinked.into_retired());
                return Some(*Box::from_raw(elem));
            }
        }
    }

    /// Returns the successor of `tail`, which is linked first if necessary.
    #[inline]
    fn link_successor(
        tail: Shared<'_, Node<T, R>, R>,
        spare: &mut Option<Owned<Node<T, R>, R>>,
    ) -> Unprotected<Node<T, R>, R> {
        let next = tail.next.load_unprotected(Acquire);
        if !next.is_null() {
            return next;
        }

        let node = spare.take().unwrap_or_else(|| Owned::new(Node::empty()));
        let ptr = Owned::as_unprotected(&node);
        match tail.next.compare_exchange(Unprotected::null(), node, Release, Acquire) {
            Ok(_) => ptr,
            Err(err) => {
                // another thread has already linked a successor, so this
                // thread's node is kept for a later attempt
                *spare = Some(err.input);
                err.loaded
            }
        }
    }
}

/********** impl Default **************************************************************************/

impl<T, R: Reclaim> Default for Queue<T, R> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R: Reclaim + fmt::Debug> fmt::Debug for Queue<T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Queue")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("reclaimer", &self.reclaimer)
            .finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T, R: Reclaim> Drop for Queue<T, R> {
    fn drop(&mut self) {
        unsafe {
            let mut curr = self.head.take();
            while let Some(mut node) = curr {
                let elem = node.elem.load(Relaxed);
                if !elem.is_null() {
                    drop(Box::from_raw(elem));
                }

                curr = node.next.take();
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// QueueRef
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A thread-local handle to a [`Queue`].
pub struct QueueRef<'q, T, R: Reclaim> {
    queue: &'q Queue<T, R>,
    local_state: R::LocalState,
}

/********** impl inherent *************************************************************************/

impl<'q, T, R: Reclaim> QueueRef<'q, T, R> {
    /// Creates a new handle to `queue`.
    ///
    /// # Errors
    ///
    /// Fails, if the reclaimer can not provide any more thread-local state.
    #[inline]
    pub fn new(queue: &'q Queue<T, R>) -> Result<Self, Error> {
        let local_state = unsafe { queue.reclaimer.build_local_state()? };
        Ok(Self { queue, local_state })
    }

    /// Pushes `elem` to the back of the queue.
    #[inline]
    pub fn push(&self, elem: T) {
        unsafe { self.queue.push_unchecked(elem, &self.local_state) }
    }

    /// Pops the element from the front of the queue or returns [`None`] if the
    /// queue is empty.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        unsafe { self.queue.pop_unchecked(&self.local_state) }
    }

    /// Attempts to reclaim records popped from the queue that are no longer
    /// in use.
    #[inline]
    pub fn reclaim(&self) {
        self.local_state.try_reclaim();
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R: Reclaim> fmt::Debug for QueueRef<'_, T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueueRef").field("queue", &(self.queue as *const _)).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T, R> {
    /// The node's payload slot, which is `null` until it is claimed by a
    /// producer and never reset afterwards.
    elem: AtomicPtr<T>,
    next: Atomic<Self, R>,
}

/********** impl inherent *************************************************************************/

impl<T, R> Node<T, R> {
    #[inline]
    fn empty() -> Self {
        Self { elem: AtomicPtr::new(ptr::null_mut()), next: Atomic::null() }
    }
}

/// Protects the value of an atomic pointer that can never be `null`.
#[inline]
fn protect_non_null<'g, T, G: Protect>(
    atomic: &Atomic<T, G::Reclaimer>,
    guard: &'g mut G,
) -> Shared<'g, T, G::Reclaimer> {
    match atomic.load(guard, Acquire) {
        Some(shared) => shared,
        None => unreachable!("queue head and tail are never null"),
    }
}

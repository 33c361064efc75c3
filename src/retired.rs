//! Type-erased pointers to retired records that can be stored and later
//! reclaimed, plus the lock-free list the reclaimers defer them in.

use core::cmp;
use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crossbeam_utils::Backoff;

use crate::sync::{AtomicPtr, AtomicUsize};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Retired
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A type-erased record that has been unlinked from its data structure and
/// awaits reclamation.
pub struct Retired {
    ptr: NonNull<()>,
    drop: unsafe fn(*mut ()),
}

/********** impl inherent *************************************************************************/

impl Retired {
    /// Creates a new [`Retired`] from a non-null pointer to a record that
    /// was allocated as a [`Box<T>`].
    ///
    /// # Safety
    ///
    /// The record must not be freed by anything other than the returned
    /// value's [`reclaim`][Retired::reclaim].
    #[inline]
    pub unsafe fn new_unchecked<T>(ptr: NonNull<T>) -> Self {
        unsafe fn drop_boxed<T>(ptr: *mut ()) {
            drop(Box::from_raw(ptr.cast::<T>()));
        }

        Self { ptr: ptr.cast(), drop: drop_boxed::<T> }
    }

    /// Returns the (erased) address of the retired record.
    #[inline]
    pub fn address(&self) -> *mut () {
        self.ptr.as_ptr()
    }

    /// Drops and de-allocates the retired record.
    ///
    /// # Safety
    ///
    /// No thread may still hold a reference to the record.
    #[inline]
    pub unsafe fn reclaim(self) {
        (self.drop)(self.ptr.as_ptr());
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for Retired {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Retired").field("address", &self.ptr).finish()
    }
}

/********** impl PartialEq + Eq *******************************************************************/

impl cmp::PartialEq for Retired {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr.eq(&other.ptr)
    }
}

impl cmp::Eq for Retired {}

/********** impl PartialOrd + Ord *****************************************************************/

impl cmp::PartialOrd for Retired {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Retired {
    #[inline]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.ptr.cmp(&other.ptr)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ReclaimStats
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A snapshot of the number of records a reclaimer has been handed and the
/// number it has actually freed so far.
///
/// Both numbers are monotonic.
/// Once all threads have left their critical sections and all retired
/// records were reclaimed, both numbers are equal.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ReclaimStats {
    /// The number of records retired.
    pub retired: usize,
    /// The number of records reclaimed.
    pub reclaimed: usize,
}

/********** impl inherent *************************************************************************/

impl ReclaimStats {
    /// Returns the number of records retired but not yet reclaimed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.retired - self.reclaimed
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Counters
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub(crate) struct Counters {
    retired: AtomicUsize,
    reclaimed: AtomicUsize,
}

/********** impl inherent *************************************************************************/

impl Counters {
    #[inline]
    pub fn new() -> Self {
        Self { retired: AtomicUsize::new(0), reclaimed: AtomicUsize::new(0) }
    }

    #[inline]
    pub fn record_retired(&self) {
        self.retired.fetch_add(1, Relaxed);
    }

    #[inline]
    pub fn record_reclaimed(&self, count: usize) {
        if count > 0 {
            self.reclaimed.fetch_add(count, Relaxed);
        }
    }

    #[inline]
    pub fn snapshot(&self) -> ReclaimStats {
        let reclaimed = self.reclaimed.load(Relaxed);
        let retired = self.retired.load(Relaxed);
        ReclaimStats { retired: cmp::max(retired, reclaimed), reclaimed }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredList
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free LIFO list of deferred records.
///
/// Records are only ever inserted with *compare-and-swap* and removed by
/// atomically taking the entire list.
#[derive(Debug)]
pub(crate) struct RetiredList {
    head: AtomicPtr<RetiredNode>,
    len: AtomicUsize,
}

/********** impl inherent *************************************************************************/

impl RetiredList {
    #[inline]
    pub fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()), len: AtomicUsize::new(0) }
    }

    /// Returns the approximate number of records in the list.
    ///
    /// The count is incremented before a record becomes visible, so it never
    /// under-reports.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Relaxed).is_null()
    }

    /// Inserts a single retired record.
    #[inline]
    pub fn push(&self, retired: Retired) {
        let node = Box::into_raw(Box::new(RetiredNode { retired, next: ptr::null_mut() }));
        self.len.fetch_add(1, Relaxed);
        unsafe { self.link(node, node) };
    }

    /// Inserts an entire chain of records previously taken from a list.
    #[inline]
    pub fn push_chain(&self, chain: RetiredChain) {
        if let Some((first, last, len)) = chain.into_raw_parts() {
            self.len.fetch_add(len, Relaxed);
            unsafe { self.link(first, last) };
        }
    }

    /// Atomically takes all records currently in the list.
    #[inline]
    pub fn take(&self) -> RetiredChain {
        let head = self.head.swap(ptr::null_mut(), Acquire);
        let chain = RetiredChain::from_raw(head);
        let len = chain.len();
        if len > 0 {
            self.len.fetch_sub(len, Relaxed);
        }

        chain
    }

    unsafe fn link(&self, first: *mut RetiredNode, last: *mut RetiredNode) {
        let backoff = Backoff::new();
        let mut head = self.head.load(Relaxed);
        loop {
            (*last).next = head;
            match self.head.compare_exchange_weak(head, first, Release, Relaxed) {
                Ok(_) => return,
                Err(curr) => {
                    head = curr;
                    backoff.spin();
                }
            }
        }
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for RetiredList {
    #[inline]
    fn drop(&mut self) {
        // only the owning reclaimer can decide whether it is safe to free any
        // records still left in the list, so they are leaked
        let chain = self.take();
        debug_assert!(chain.is_empty(), "retired records left in a dropped list");
        chain.discard();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredChain
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An exclusively owned chain of retired records taken from a [`RetiredList`].
#[derive(Debug)]
pub(crate) struct RetiredChain {
    head: *mut RetiredNode,
}

/********** impl inherent *************************************************************************/

impl RetiredChain {
    #[inline]
    pub fn new() -> Self {
        Self { head: ptr::null_mut() }
    }

    #[inline]
    fn from_raw(head: *mut RetiredNode) -> Self {
        Self { head }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub fn len(&self) -> usize {
        let mut len = 0;
        let mut curr = self.head;
        while !curr.is_null() {
            len += 1;
            curr = unsafe { (*curr).next };
        }

        len
    }

    /// Prepends a single record to the chain.
    #[inline]
    pub fn push(&mut self, retired: Retired) {
        let node = Box::new(RetiredNode { retired, next: self.head });
        self.head = Box::into_raw(node);
    }

    /// Reclaims all records in the chain and returns their number.
    ///
    /// # Safety
    ///
    /// No thread may still hold a reference to any of the records.
    #[inline]
    pub unsafe fn reclaim_all(self) -> usize {
        self.into_iter().fold(0, |count, retired| {
            retired.reclaim();
            count + 1
        })
    }

    fn into_raw_parts(self) -> Option<(*mut RetiredNode, *mut RetiredNode, usize)> {
        let first = self.head;
        if first.is_null() {
            return None;
        }

        let mut last = first;
        let mut len = 1;
        unsafe {
            while !(*last).next.is_null() {
                last = (*last).next;
                len += 1;
            }
        }

        Some((first, last, len))
    }

    /// Frees the chain's list nodes but leaks the records themselves.
    fn discard(self) {
        drop(self.into_iter());
    }
}

/********** impl IntoIterator *********************************************************************/

impl IntoIterator for RetiredChain {
    type Item = Retired;
    type IntoIter = IntoIter;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        IntoIter { curr: self.head }
    }
}

/********** impl Send *****************************************************************************/

unsafe impl Send for RetiredChain {}

////////////////////////////////////////////////////////////////////////////////////////////////////
// IntoIter
////////////////////////////////////////////////////////////////////////////////////////////////////

pub(crate) struct IntoIter {
    curr: *mut RetiredNode,
}

/********** impl Iterator *************************************************************************/

impl Iterator for IntoIter {
    type Item = Retired;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.curr.is_null() {
            return None;
        }

        let node = unsafe { Box::from_raw(self.curr) };
        self.curr = node.next;
        Some(node.retired)
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for IntoIter {
    #[inline]
    fn drop(&mut self) {
        // frees the list nodes but leaks the records themselves
        while self.next().is_some() {}
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredNode
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
struct RetiredNode {
    retired: Retired,
    next: *mut RetiredNode,
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Retired, RetiredChain, RetiredList};

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn retire<'a>(counter: &'a AtomicUsize) -> Retired {
        let ptr = NonNull::from(Box::leak(Box::new(DropCount(counter))));
        unsafe { Retired::new_unchecked(ptr) }
    }

    #[test]
    fn reclaim_drops_record() {
        let counter = AtomicUsize::new(0);
        unsafe { retire(&counter).reclaim() };
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn list_take_and_rechain() {
        let counter = AtomicUsize::new(0);
        let list = RetiredList::new();
        for _ in 0..3 {
            list.push(retire(&counter));
        }
        assert_eq!(list.len(), 3);

        let chain = list.take();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(chain.len(), 3);

        list.push_chain(chain);
        assert_eq!(list.len(), 3);

        let reclaimed = unsafe { list.take().reclaim_all() };
        assert_eq!(reclaimed, 3);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn chain_push() {
        let counter = AtomicUsize::new(0);
        let mut chain = RetiredChain::new();
        chain.push(retire(&counter));
        chain.push(retire(&counter));
        assert_eq!(chain.len(), 2);
        assert_eq!(unsafe { chain.reclaim_all() }, 2);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}

//! Split reference counting: the external count travelling with each pointer
//! to a node and the internal count stored in the node itself.

use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crate::counted::{AtomicCountedPtr, CountedPtr};
use crate::sync::AtomicU64;

////////////////////////////////////////////////////////////////////////////////////////////////////
// AtomicNodeCounter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The packed `{internal count, external counters}` pair of a node.
///
/// The internal count may become temporarily negative, when a thread releases
/// its reference before the thread that unlinked the node had the chance to
/// fold in the external count.
/// The node must be freed by exactly the one thread whose update leaves both
/// parts at zero.
#[derive(Debug)]
pub(crate) struct AtomicNodeCounter(AtomicU64);

/********** impl inherent *************************************************************************/

impl AtomicNodeCounter {
    /// Creates a new counter for a node that is referenced by
    /// `external_counters` counted pointers.
    #[inline]
    pub fn new(external_counters: u32) -> Self {
        Self(AtomicU64::new(pack(0, external_counters)))
    }

    /// Adds another external counter, for a new counted pointer to the node.
    #[inline]
    pub fn add_external_counter(&self) {
        self.0.fetch_add(1 << 32, Relaxed);
    }

    /// Drops one internal reference and returns `true` if the node must be
    /// freed by the caller.
    #[inline]
    pub fn release_ref(&self) -> bool {
        let mut curr = self.0.load(Relaxed);
        loop {
            let (internal, external) = unpack(curr);
            let internal = internal - 1;
            match self.0.compare_exchange_weak(curr, pack(internal, external), AcqRel, Relaxed) {
                Ok(_) => return internal == 0 && external == 0,
                Err(actual) => curr = actual,
            }
        }
    }

    /// Retires one of the node's external counters and folds its count into
    /// the internal count.
    ///
    /// Returns `true` if the node must be freed by the caller.
    #[inline]
    pub fn free_external_counter(&self, count_increase: i32) -> bool {
        let mut curr = self.0.load(Relaxed);
        loop {
            let (internal, external) = unpack(curr);
            debug_assert!(external > 0, "external counter freed more than once");
            let (internal, external) = (internal + count_increase, external - 1);
            match self.0.compare_exchange_weak(curr, pack(internal, external), AcqRel, Relaxed) {
                Ok(_) => return internal == 0 && external == 0,
                Err(actual) => curr = actual,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn load(&self) -> (i32, u32) {
        unpack(self.0.load(Relaxed))
    }
}

#[inline]
fn pack(internal: i32, external: u32) -> u64 {
    (u64::from(external) << 32) | u64::from(internal as u32)
}

#[inline]
fn unpack(raw: u64) -> (i32, u32) {
    (raw as u32 as i32, (raw >> 32) as u32)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// CountedNode (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A heap allocated node that carries an [`AtomicNodeCounter`].
///
/// # Safety
///
/// Nodes must be allocated as `Box<Self>` and dropping a node must not drop
/// any payload that may already have been moved out of it.
pub(crate) unsafe trait CountedNode: Sized {
    fn counter(&self) -> &AtomicNodeCounter;
}

/// Increments the external count stored in `slot`.
///
/// `old` is updated to the value that was actually incremented.
/// Nothing is incremented, if `slot` holds or comes to hold a `null` pointer.
#[inline]
pub(crate) fn increase_external_count<N>(slot: &AtomicCountedPtr<N>, old: &mut CountedPtr<N>) {
    while !old.is_null() {
        let new = old.increment();
        match slot.compare_exchange(*old, new, Acquire, Relaxed) {
            Ok(_) => {
                *old = new;
                return;
            }
            Err(actual) => *old = actual,
        }
    }
}

/// Reverts an increment made by [`increase_external_count`], provided `slot`
/// has not changed since.
///
/// Returns `false` if the slot changed, in which case the reference must be
/// released through [`release_ref`] instead.
#[inline]
pub(crate) fn undo_increase<N>(slot: &AtomicCountedPtr<N>, old: CountedPtr<N>) -> bool {
    debug_assert!(old.count() > 0, "external count underflow");
    let prev = old.with_count(old.count() - 1);
    slot.compare_exchange(old, prev, Release, Relaxed).is_ok()
}

/// Folds the count of an unlinked counted pointer into its node.
///
/// # Safety
///
/// `old` must be the last value of a counted pointer to a live node, which
/// has just been replaced in its slot by the caller.
#[inline]
pub(crate) unsafe fn free_external_counter<N: CountedNode>(old: CountedPtr<N>) {
    let ptr = old.ptr();
    let count_increase = i32::from(old.count()) - 2;
    if (*ptr).counter().free_external_counter(count_increase) {
        drop(Box::from_raw(ptr));
    }
}

/// Gives up an external counter that was added for a counted pointer which
/// never got published, together with the caller's own reference.
///
/// # Safety
///
/// The caller must hold a reference to the live node at `ptr`.
#[inline]
pub(crate) unsafe fn discard_external_counter<N: CountedNode>(ptr: *mut N) {
    if (*ptr).counter().free_external_counter(-1) {
        drop(Box::from_raw(ptr));
    }
}

/// Releases a single reference acquired through [`increase_external_count`].
///
/// # Safety
///
/// The caller must hold such a reference to the live node at `ptr`.
#[inline]
pub(crate) unsafe fn release_ref<N: CountedNode>(ptr: *mut N) {
    if (*ptr).counter().release_ref() {
        drop(Box::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::{pack, unpack, AtomicNodeCounter};

    #[test]
    fn pack_negative_internal() {
        assert_eq!(unpack(pack(-3, 2)), (-3, 2));
        assert_eq!(unpack(pack(i32::MAX, u32::MAX)), (i32::MAX, u32::MAX));
    }

    #[test]
    fn free_after_release() {
        // a reader releases before the popping thread folds in its count
        let counter = AtomicNodeCounter::new(1);
        assert!(!counter.release_ref());
        assert_eq!(counter.load(), (-1, 1));
        assert!(counter.free_external_counter(1));
    }

    #[test]
    fn release_after_free() {
        let counter = AtomicNodeCounter::new(1);
        assert!(!counter.free_external_counter(1));
        assert_eq!(counter.load(), (1, 0));
        assert!(counter.release_ref());
    }

    #[test]
    fn discarded_counter() {
        // a pushing thread holds a reference and adds a counter it never uses
        let counter = AtomicNodeCounter::new(1);
        counter.add_external_counter();
        assert_eq!(counter.load(), (0, 2));
        assert!(!counter.free_external_counter(-1));
        assert_eq!(counter.load(), (-1, 1));
        assert!(counter.free_external_counter(1));
    }

    #[test]
    fn two_external_counters() {
        let counter = AtomicNodeCounter::new(2);
        assert!(!counter.free_external_counter(0));
        assert!(counter.free_external_counter(0));
    }
}

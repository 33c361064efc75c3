//! Reclamation by counting the threads currently inside a critical section.
//!
//! A record that is retired while its retiring thread is the only one inside
//! the section is freed right away.
//! All other records are deferred to a shared pending list, which is drained
//! in one pass by the last thread to leave the section.
//!
//! Under sustained contention, i.e. if there is never a moment in which at
//! most one thread is inside the section, the pending list keeps growing and
//! reclamation is deferred indefinitely.
//! All records left over are freed once the [`Counting`] instance is dropped.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::Ordering::{self, SeqCst};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use crate::atomic::Atomic;
use crate::error::Error;
use crate::retired::{Counters, ReclaimStats, Retired, RetiredList};
use crate::sync::{fence, AtomicUsize};
use crate::traits::{LocalState, Protect, Reclaim};
use crate::Shared;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Counting
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A memory reclamation mechanism that gates reclamation on the number of
/// threads currently accessing the data structure.
pub struct Counting {
    active: CachePadded<AtomicUsize>,
    pending: RetiredList,
    counters: Counters,
}

/********** impl inherent *************************************************************************/

impl Counting {
    /// Creates a new reclaimer.
    #[inline]
    pub fn new() -> Self {
        Self {
            active: CachePadded::new(AtomicUsize::new(0)),
            pending: RetiredList::new(),
            counters: Counters::new(),
        }
    }

    /// Returns the number of records that are currently deferred.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    fn enter(&self) {
        self.active.fetch_add(1, SeqCst);
        fence(SeqCst);
    }

    #[inline]
    fn leave(&self) {
        if self.active.load(SeqCst) == 1 && !self.pending.is_empty() {
            let chain = self.pending.take();
            if self.active.fetch_sub(1, SeqCst) == 1 {
                let count = unsafe { chain.reclaim_all() };
                if count > 0 {
                    self.counters.record_reclaimed(count);
                    trace!(count, "drained pending records on leaving the critical section");
                }
            } else {
                // another thread entered in the meantime and may hold
                // references to any of the pending records
                self.pending.push_chain(chain);
            }
        } else {
            self.active.fetch_sub(1, SeqCst);
        }
    }

    #[inline]
    unsafe fn retire(&self, retired: Retired) {
        self.counters.record_retired();
        fence(SeqCst);
        if self.active.load(SeqCst) == 1 {
            retired.reclaim();
            self.counters.record_reclaimed(1);
        } else {
            self.pending.push(retired);
        }
    }
}

/********** impl Default **************************************************************************/

impl Default for Counting {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for Counting {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Counting")
            .field("active", &self.active.load(SeqCst))
            .field("pending", &self.pending.len())
            .finish()
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for Counting {
    #[inline]
    fn drop(&mut self) {
        let count = unsafe { self.pending.take().reclaim_all() };
        self.counters.record_reclaimed(count);
        if count > 0 {
            debug!(count, "freed pending records on teardown");
        }
    }
}

/********** impl Reclaim **************************************************************************/

unsafe impl Reclaim for Counting {
    type LocalState = Local;

    #[inline]
    unsafe fn build_local_state(&self) -> Result<Self::LocalState, Error> {
        Ok(Local { reclaimer: NonNull::from(self) })
    }

    #[inline]
    fn stats(&self) -> ReclaimStats {
        self.counters.snapshot()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The thread-local state for the [`Counting`] reclaimer.
#[derive(Debug)]
pub struct Local {
    reclaimer: NonNull<Counting>,
}

/********** impl LocalState ***********************************************************************/

unsafe impl LocalState for Local {
    type Reclaimer = Counting;
    type Guard = Guard;

    #[inline]
    fn build_guard(&self) -> Self::Guard {
        let reclaimer = unsafe { self.reclaimer.as_ref() };
        reclaimer.enter();
        Guard { reclaimer: self.reclaimer }
    }

    #[inline]
    unsafe fn retire_record(&self, retired: Retired) {
        self.reclaimer.as_ref().retire(retired);
    }

    #[inline]
    fn try_reclaim(&self) {
        drop(self.build_guard());
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Guard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A guard marking the lifetime of a critical section.
///
/// All values loaded through a guard remain protected until it is dropped,
/// releasing it has no effect.
#[derive(Debug)]
pub struct Guard {
    reclaimer: NonNull<Counting>,
}

/********** impl Protect **************************************************************************/

unsafe impl Protect for Guard {
    type Reclaimer = Counting;

    #[inline]
    fn protect<'g, T>(
        &'g mut self,
        atomic: &Atomic<T, Self::Reclaimer>,
        order: Ordering,
    ) -> Option<Shared<'g, T, Self::Reclaimer>> {
        NonNull::new(atomic.load_raw(order)).map(|ptr| unsafe { Shared::from_non_null(ptr) })
    }

    #[inline]
    fn release(&mut self) {}
}

/********** impl Drop *****************************************************************************/

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.reclaimer.as_ref().leave() };
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::Counting;
    use crate::retired::Retired;
    use crate::traits::{LocalState, Reclaim};

    struct DropCount<'a>(&'a AtomicUsize);

    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn retired(counter: &AtomicUsize) -> Retired {
        let ptr = NonNull::from(Box::leak(Box::new(DropCount(counter))));
        unsafe { Retired::new_unchecked(ptr) }
    }

    #[test]
    fn sole_thread_reclaims_immediately() {
        let counter = AtomicUsize::new(0);
        let reclaimer = Counting::new();
        let local = unsafe { reclaimer.build_local_state() }.unwrap();

        let guard = local.build_guard();
        unsafe { local.retire_record(retired(&counter)) };
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        drop(guard);

        let stats = reclaimer.stats();
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.reclaimed, 1);
    }

    #[test]
    fn last_one_out_drains() {
        let counter = AtomicUsize::new(0);
        let reclaimer = Counting::new();
        let first = unsafe { reclaimer.build_local_state() }.unwrap();
        let second = unsafe { reclaimer.build_local_state() }.unwrap();

        let outer = first.build_guard();
        let inner = second.build_guard();
        unsafe { second.retire_record(retired(&counter)) };
        unsafe { second.retire_record(retired(&counter)) };
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert_eq!(reclaimer.pending(), 2);

        drop(inner);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        drop(outer);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert_eq!(reclaimer.pending(), 0);
        assert_eq!(reclaimer.stats().pending(), 0);
    }

    #[test]
    fn drop_frees_pending() {
        let counter = AtomicUsize::new(0);
        {
            let reclaimer = Counting::new();
            let local = unsafe { reclaimer.build_local_state() }.unwrap();
            let guard = local.build_guard();
            let other = local.build_guard();
            unsafe { local.retire_record(retired(&counter)) };
            // leak both guards, so the section is never left
            std::mem::forget(guard);
            std::mem::forget(other);
            assert_eq!(counter.load(Ordering::Relaxed), 0);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}

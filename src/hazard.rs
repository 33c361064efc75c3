//! Reclamation through hazard pointers.
//!
//! Every thread handle owns one slot of a fixed-size table and publishes the
//! address of the record it is about to de-reference in it.
//! Retired records are only freed once no slot watches their address any
//! more, otherwise they are deferred and checked again by later scans.

use core::fmt;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering::{self, AcqRel, Acquire, Relaxed, Release, SeqCst};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace, warn};

use crate::atomic::Atomic;
use crate::error::Error;
use crate::retired::{Counters, ReclaimStats, Retired, RetiredChain, RetiredList};
use crate::sync::{fence, AtomicPtr, AtomicUsize};
use crate::traits::{LocalState, Protect, Reclaim};
use crate::Shared;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The configuration of a [`HazardPointers`] reclaimer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Config {
    /// The number of hazard pointer slots and hence the maximum number of
    /// thread handles that can exist at the same time.
    pub capacity: usize,
    /// The number of deferred records at which a retiring thread scans the
    /// table again.
    pub scan_threshold: usize,
}

/********** impl inherent *************************************************************************/

impl Config {
    /// The default number of hazard pointer slots.
    pub const DEFAULT_CAPACITY: usize = 100;
    /// The default scan threshold.
    pub const DEFAULT_SCAN_THRESHOLD: usize = 1;

    /// Creates a new configuration with the given capacity and the default
    /// scan threshold.
    #[inline]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self { capacity, scan_threshold: Self::DEFAULT_SCAN_THRESHOLD }
    }
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self { capacity: Self::DEFAULT_CAPACITY, scan_threshold: Self::DEFAULT_SCAN_THRESHOLD }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardPointers
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A memory reclamation mechanism based on a bounded table of hazard
/// pointers.
pub struct HazardPointers {
    slots: Box<[CachePadded<HazardSlot>]>,
    scan_threshold: usize,
    deferred: RetiredList,
    counters: Counters,
}

/********** impl inherent *************************************************************************/

impl HazardPointers {
    /// Creates a new reclaimer with the default [`Config`].
    #[inline]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new reclaimer with the given `config`.
    ///
    /// The entire table of hazard pointer slots is allocated up front.
    #[inline]
    pub fn with_config(config: Config) -> Self {
        let slots = (0..config.capacity).map(|_| CachePadded::new(HazardSlot::new())).collect();
        Self {
            slots,
            scan_threshold: config.scan_threshold.max(1),
            deferred: RetiredList::new(),
            counters: Counters::new(),
        }
    }

    /// Returns the number of hazard pointer slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of records that are currently deferred.
    #[inline]
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    fn acquire_slot(&self) -> Result<NonNull<HazardSlot>, Error> {
        let id = thread_id();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.owner.compare_exchange(FREE, id, AcqRel, Relaxed).is_ok() {
                debug!(index, thread = id, "acquired hazard pointer slot");
                return Ok(NonNull::from(&**slot));
            }
        }

        warn!(capacity = self.capacity(), "hazard pointer table exhausted");
        Err(Error::ResourceExhausted { capacity: self.capacity() })
    }

    #[inline]
    fn is_watched(&self, addr: *mut ()) -> bool {
        self.slots.iter().any(|slot| slot.watched.load(Acquire) == addr)
    }

    unsafe fn retire(&self, retired: Retired) {
        self.counters.record_retired();
        fence(SeqCst);
        if self.is_watched(retired.address()) {
            self.deferred.push(retired);
            if self.deferred.len() >= self.scan_threshold {
                self.scan();
            }
        } else {
            retired.reclaim();
            self.counters.record_reclaimed(1);
        }
    }

    /// Frees all deferred records that are not watched by any slot and
    /// re-inserts the rest.
    fn scan(&self) {
        let chain = self.deferred.take();
        if chain.is_empty() {
            return;
        }

        fence(SeqCst);
        let mut watched: Vec<*mut ()> = self
            .slots
            .iter()
            .map(|slot| slot.watched.load(Acquire))
            .filter(|addr| !addr.is_null())
            .collect();
        watched.sort_unstable();

        let mut remaining = RetiredChain::new();
        let mut reclaimed = 0;
        for retired in chain {
            if watched.binary_search(&retired.address()).is_ok() {
                remaining.push(retired);
            } else {
                unsafe { retired.reclaim() };
                reclaimed += 1;
            }
        }

        self.counters.record_reclaimed(reclaimed);
        trace!(reclaimed, watched = watched.len(), "scanned hazard pointers");
        self.deferred.push_chain(remaining);
    }
}

/********** impl Default **************************************************************************/

impl Default for HazardPointers {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for HazardPointers {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HazardPointers")
            .field("capacity", &self.capacity())
            .field("scan_threshold", &self.scan_threshold)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for HazardPointers {
    #[inline]
    fn drop(&mut self) {
        let count = unsafe { self.deferred.take().reclaim_all() };
        self.counters.record_reclaimed(count);
        if count > 0 {
            debug!(count, "freed deferred records on teardown");
        }
    }
}

/********** impl Reclaim **************************************************************************/

unsafe impl Reclaim for HazardPointers {
    type LocalState = Local;

    #[inline]
    unsafe fn build_local_state(&self) -> Result<Self::LocalState, Error> {
        let slot = self.acquire_slot()?;
        Ok(Local { reclaimer: NonNull::from(self), slot })
    }

    #[inline]
    fn stats(&self) -> ReclaimStats {
        self.counters.snapshot()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The thread-local state for the [`HazardPointers`] reclaimer, which owns
/// one slot of the table until it is dropped.
#[derive(Debug)]
pub struct Local {
    reclaimer: NonNull<HazardPointers>,
    slot: NonNull<HazardSlot>,
}

/********** impl LocalState ***********************************************************************/

unsafe impl LocalState for Local {
    type Reclaimer = HazardPointers;
    type Guard = Guard;

    #[inline]
    fn build_guard(&self) -> Self::Guard {
        Guard { slot: self.slot }
    }

    #[inline]
    unsafe fn retire_record(&self, retired: Retired) {
        self.reclaimer.as_ref().retire(retired);
    }

    #[inline]
    fn try_reclaim(&self) {
        unsafe { self.reclaimer.as_ref().scan() };
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for Local {
    #[inline]
    fn drop(&mut self) {
        let slot = unsafe { self.slot.as_ref() };
        slot.watched.store(ptr::null_mut(), Release);
        let id = slot.owner.swap(FREE, Release);
        debug!(thread = id, "released hazard pointer slot");
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Guard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A guard protecting at most one record at a time through its thread's
/// hazard pointer slot.
#[derive(Debug)]
pub struct Guard {
    slot: NonNull<HazardSlot>,
}

/********** impl Protect **************************************************************************/

unsafe impl Protect for Guard {
    type Reclaimer = HazardPointers;

    #[inline]
    fn protect<'g, T>(
        &'g mut self,
        atomic: &Atomic<T, Self::Reclaimer>,
        order: Ordering,
    ) -> Option<Shared<'g, T, Self::Reclaimer>> {
        let slot = unsafe { self.slot.as_ref() };
        let mut curr = atomic.load_raw(Relaxed);
        loop {
            let ptr = match NonNull::new(curr) {
                Some(ptr) => ptr,
                None => {
                    slot.watched.store(ptr::null_mut(), Release);
                    return None;
                }
            };

            slot.watched.store(ptr.as_ptr().cast(), Relaxed);
            fence(SeqCst);
            curr = atomic.load_raw(order);
            if curr == ptr.as_ptr() {
                return Some(unsafe { Shared::from_non_null(ptr) });
            }
        }
    }

    #[inline]
    fn release(&mut self) {
        unsafe { self.slot.as_ref() }.watched.store(ptr::null_mut(), Release);
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        self.release();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

const FREE: usize = 0;

#[derive(Debug)]
struct HazardSlot {
    owner: AtomicUsize,
    watched: AtomicPtr<()>,
}

impl HazardSlot {
    #[inline]
    fn new() -> Self {
        Self { owner: AtomicUsize::new(FREE), watched: AtomicPtr::new(ptr::null_mut()) }
    }
}

/// Returns a process-wide unique, non-zero id for the calling thread.
#[inline]
fn thread_id() -> usize {
    use std::sync::atomic::AtomicUsize;

    static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
    std::thread_local!(static THREAD_ID: usize = NEXT_ID.fetch_add(1, Relaxed));

    THREAD_ID.with(|id| *id)
}

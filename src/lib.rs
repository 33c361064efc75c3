//! Lock-free stacks and queues with pluggable safe memory reclamation.
//!
//! The collections in this crate never take a lock.
//! Every operation is a short sequence of loads followed by a retry loop
//! around a single compare-and-swap.
//! The hard part is deciding when a node that was unlinked by one thread can
//! be freed while other threads might still be reading it.
//! Three strategies for this are provided:
//!
//! - [`Counting`]: a gate counting the threads currently inside a critical
//!   section; the last thread to leave frees everything retired meanwhile.
//! - [`HazardPointers`]: a bounded table of per-thread published addresses
//!   that must not be freed.
//! - split reference counting: each node carries an internal count and the
//!   pointers to it carry external counts, see [`CountedStack`] and
//!   [`CountedQueue`].
//!
//! The first two are interchangeable through the [`Reclaim`] family of
//! traits and parameterize [`Stack`] and [`Queue`].
//! Split reference counting changes the layout of the nodes themselves and is
//! hence implemented by dedicated types.
//!
//! # Example
//!
//! ```
//! use conquer_lockfree::{HazardPointers, Stack};
//!
//! let stack: Stack<i32, HazardPointers> = Stack::new();
//! let handle = stack.handle().unwrap();
//!
//! handle.push(5);
//! handle.push(8);
//! handle.push(10);
//!
//! assert_eq!(handle.pop(), Some(10));
//! assert_eq!(handle.pop(), Some(8));
//! ```

#[macro_use]
mod macros;

mod atomic;
mod counted;
mod error;
mod owned;
mod retired;
mod shared;
mod split;
mod sync;
mod traits;
mod unlinked;
mod unprotected;

pub mod counting;
pub mod hazard;
pub mod queue;
pub mod stack;

use core::marker::PhantomData;
use core::ptr::NonNull;

pub use crate::atomic::{Atomic, CompareArg, CompareExchangeError, StoreArg};
pub use crate::counted::{AtomicCountedPtr, CountedPtr};
pub use crate::counting::Counting;
pub use crate::error::Error;
pub use crate::hazard::HazardPointers;
pub use crate::queue::counted::CountedQueue;
pub use crate::queue::{Queue, QueueRef};
pub use crate::retired::{ReclaimStats, Retired};
pub use crate::stack::counted::CountedStack;
pub use crate::stack::{Stack, StackRef};
pub use crate::traits::{LocalState, Protect, Reclaim};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Owned (impl in owned.rs)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A pointer type for heap allocated values similar to [`Box`].
///
/// `Owned` values are the only way to create new records that can be stored
/// in an [`Atomic`].
/// Once stored, ownership is transferred to the data structure and the record
/// can only be freed again by retiring it through the associated
/// [`Reclaim`] mechanism.
#[derive(Eq, Ord, PartialEq, PartialOrd)]
pub struct Owned<T, R> {
    inner: NonNull<T>,
    _marker: PhantomData<(T, R)>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Shared (impl in shared.rs)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A shared reference to a value that is actively protected from reclamation by
/// other threads.
///
/// `Shared` values have similar semantics to shared references (`&'g T`), i.e.
/// they can be trivially copied, cloned and (safely) de-referenced.
/// They are borrowed from guard values implementing the [`Protect`] trait and
/// remain valid for as long as the guard is neither dropped nor released.
pub struct Shared<'g, T, R> {
    inner: NonNull<T>,
    _marker: PhantomData<(&'g T, R)>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Unlinked (impl in unlinked.rs)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A reference to a value that has been removed from its previous location in
/// memory and is hence no longer reachable by other threads.
///
/// `Unlinked` values are the result of successful *compare-and-swap*
/// operations on [`Atomic`] values.
/// They are move-only types, but they don't have full ownership semantics,
/// either, since other threads may still hold protected references to the
/// same value.
/// Dropping an `Unlinked` value without explicitly retiring it results in a
/// memory leak.
#[derive(Eq, Ord, PartialEq, PartialOrd)]
#[must_use = "unlinked values are meant to be retired, otherwise a memory leak is highly likely"]
pub struct Unlinked<T, R> {
    inner: NonNull<T>,
    _marker: PhantomData<(T, R)>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Unprotected (impl in unprotected.rs)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A (nullable) reference to a value loaded from an [`Atomic`] that is not
/// actively protected from reclamation.
///
/// `Unprotected` values can not be safely de-referenced, but since they were
/// loaded from [`Atomic`] values they must (at least at one point) have been
/// *valid* references.
/// They are useful as arguments for subsequent *compare-and-swap* operations,
/// which only ever succeed if the value is still valid.
#[derive(Eq, Ord, PartialEq, PartialOrd)]
pub struct Unprotected<T, R> {
    inner: *mut T,
    _marker: PhantomData<R>,
}

use core::sync::atomic::Ordering;

use crate::atomic::Atomic;
use crate::error::Error;
use crate::retired::{ReclaimStats, Retired};
use crate::Shared;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Reclaim (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for memory reclamation mechanisms that can be embedded into a
/// lock-free data structure.
///
/// Each data structure owns exactly one instance of its reclaimer, which in
/// turn owns all global reclamation state, e.g. the list of records that were
/// retired but could not be freed yet.
/// When the data structure is dropped, so is the reclaimer, which frees all
/// records still left over.
///
/// # Safety
///
/// Implementors must never reclaim a retired record while any thread still
/// holds a [`Shared`] reference to it obtained through a guard of the same
/// reclaimer instance.
pub unsafe trait Reclaim: Default + Send + Sync + Sized + 'static {
    /// The associated thread-local state.
    type LocalState: LocalState<Reclaimer = Self>;

    /// Builds a new thread-local state, which is required for protecting
    /// records and retiring them.
    ///
    /// # Errors
    ///
    /// Fails, if the reclaimer has only a bounded amount of per-thread
    /// resources and all of them are currently in use.
    ///
    /// # Safety
    ///
    /// The returned state must not outlive `self`.
    unsafe fn build_local_state(&self) -> Result<Self::LocalState, Error>;

    /// Returns a snapshot of the reclaimer's statistics.
    fn stats(&self) -> ReclaimStats;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalState (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for thread-local state instances of a specific [`Reclaim`]
/// mechanism.
///
/// Thread-local states are not [`Send`] and are meant to live for as long as
/// the thread uses the associated data structure.
/// Their two primary purposes are:
///
/// - creating new guard instances (which implement the [`Protect`] trait)
/// - retiring records
pub unsafe trait LocalState: Sized {
    /// The associated [`Reclaim`] mechanism.
    type Reclaimer: Reclaim;
    /// The associated [`Protect`] type.
    type Guard: Protect<Reclaimer = Self::Reclaimer>;

    /// Creates a new guard instance.
    ///
    /// At most one guard built from the same local state should be alive at
    /// any time.
    fn build_guard(&self) -> Self::Guard;

    /// Retires the given record, which is either reclaimed immediately or
    /// deferred until no other thread can hold a reference to it any more.
    ///
    /// # Safety
    ///
    /// The record must have been unlinked from the data structure, so that no
    /// thread can newly acquire a reference to it, and it must be retired at
    /// most once.
    /// This must be called while the guard that was used to unlink the record
    /// is still alive, but after it has been [released][Protect::release].
    unsafe fn retire_record(&self, retired: Retired);

    /// Opportunistically reclaims deferred records that are no longer
    /// referenced by any thread.
    ///
    /// Calling this is never required for eventual reclamation and has no
    /// effect if there is nothing to reclaim.
    fn try_reclaim(&self);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Protect (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for guard types associated with a specific [`Reclaim`] mechanism.
pub unsafe trait Protect: Sized {
    /// The associated memory reclamation scheme.
    type Reclaimer: Reclaim;

    /// Loads and protects the value currently stored in `atomic` and returns
    /// a protected [`Shared`] reference to it or [`None`] if it is `null`.
    ///
    /// Any previously protected value is no longer protected afterwards.
    /// `protect` takes an [`Ordering`] argument, which describes the memory
    /// ordering of the final (validating) load.
    fn protect<'g, T>(
        &'g mut self,
        atomic: &Atomic<T, Self::Reclaimer>,
        order: Ordering,
    ) -> Option<Shared<'g, T, Self::Reclaimer>>;

    /// Releases any protection that may be provided by the guard.
    ///
    /// The guard remains usable for further calls to
    /// [`protect`][Protect::protect].
    fn release(&mut self);
}

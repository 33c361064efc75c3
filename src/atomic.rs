use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering;

use crate::sync::AtomicPtr;
use crate::traits::Protect;
use crate::{Owned, Shared, Unlinked, Unprotected};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Atomic
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An atomic pointer type to an owned heap allocated value similar to
/// [`AtomicPtr`](core::sync::atomic::AtomicPtr).
///
/// The `Atomic` type has similarities to [`Option<Box>`][Option], as it is a
/// pointer that is either `null` or otherwise must point to a valid, heap
/// allocated value.
/// Note, that the type does not implement the [`Drop`](core::ops::Drop) trait,
/// meaning it does not automatically take care of memory de-allocation when it
/// goes out of scope.
/// Use the [`take`][Atomic::take] method to extract an (optional) [`Owned`]
/// value, which *does* correctly deallocate memory when it goes out of scope.
pub struct Atomic<T, R> {
    inner: AtomicPtr<T>,
    _marker: PhantomData<(T, R)>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T, R> Send for Atomic<T, R> where T: Send + Sync {}
unsafe impl<T, R> Sync for Atomic<T, R> where T: Send + Sync {}

/********** impl inherent *************************************************************************/

impl<T, R> Atomic<T, R> {
    /// Creates a new `null` pointer.
    #[inline]
    pub fn null() -> Self {
        Self { inner: AtomicPtr::new(ptr::null_mut()), _marker: PhantomData }
    }

    /// Allocates a new [`Owned`] containing the given `val` and immediately
    /// stores it in an `Atomic`.
    #[inline]
    pub fn new(val: T) -> Self {
        Self::from(Owned::<T, R>::new(val))
    }

    /// Creates a new [`Atomic`] from the given raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be either `null` or a pointer to a heap allocated record,
    /// e.g. one that was [leaked][Owned::leak] from an [`Owned`].
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self { inner: AtomicPtr::new(ptr), _marker: PhantomData }
    }

    /// Takes the value out of the `Atomic`, leaving a `null` pointer in its
    /// place.
    ///
    /// # Safety
    ///
    /// The caller must be the only (remaining) owner of the record.
    #[inline]
    pub unsafe fn take(&mut self) -> Option<Owned<T, R>> {
        NonNull::new(self.inner.swap(ptr::null_mut(), Ordering::Relaxed))
            .map(|ptr| Owned::from_raw(ptr))
    }

    /// Loads a raw value from the pointer.
    ///
    /// `load_raw` takes an [`Ordering`] argument, which describes the memory
    /// ordering of this operation.
    ///
    /// # Panics
    ///
    /// Panics if `order` is [`Release`][Ordering::Release] or
    /// [`AcqRel`][Ordering::AcqRel].
    #[inline]
    pub fn load_raw(&self, order: Ordering) -> *mut T {
        self.inner.load(order)
    }

    /// Loads an [`Unprotected`] reference from the `Atomic`.
    ///
    /// The returned reference is explicitly **not** protected from reclamation,
    /// meaning another thread could free the value's memory at any time.
    /// It can be useful to load an unprotected pointer if that pointer does not
    /// need to be de-referenced, but is only used to reinsert it in a different
    /// spot, which is e.g. done when popping a node from a stack.
    ///
    /// # Panics
    ///
    /// Panics if `order` is [`Release`][Ordering::Release] or
    /// [`AcqRel`][Ordering::AcqRel].
    #[inline]
    pub fn load_unprotected(&self, order: Ordering) -> Unprotected<T, R> {
        unsafe { Unprotected::from_raw(self.load_raw(order)) }
    }

    /// Loads a value from the pointer and uses `guard` to protect it.
    ///
    /// If the loaded value is non-null, the value is guaranteed to be protected
    /// from reclamation during the lifetime of the `guard` borrow.
    #[inline]
    pub fn load<'g, G>(&self, guard: &'g mut G, order: Ordering) -> Option<Shared<'g, T, R>>
    where
        G: Protect<Reclaimer = R>,
    {
        guard.protect(self, order)
    }

    /// Stores either `null` or a valid pointer to an owned heap allocated value
    /// into the pointer.
    ///
    /// Note, that overwriting a non-null value through `store` will very likely
    /// lead to memory leaks.
    ///
    /// # Panics
    ///
    /// Panics if `order` is [`Acquire`][Ordering::Acquire] or
    /// [`AcqRel`][Ordering::AcqRel].
    #[inline]
    pub fn store(&self, ptr: impl StoreArg<Item = T, Reclaimer = R>, order: Ordering) {
        let ptr = ManuallyDrop::new(ptr);
        self.inner.store(ptr.as_ptr(), order);
    }

    /// Stores `new` into the pointer if it still contains `current`.
    ///
    /// On success, `current` is converted into its associated
    /// [`Unlinked`][CompareArg::Unlinked] type.
    /// On failure, the actually loaded value is returned alongside the
    /// (unchanged) `new` argument.
    #[inline]
    pub fn compare_exchange<C, S>(
        &self,
        current: C,
        new: S,
        success: Ordering,
        failure: Ordering,
    ) -> Result<C::Unlinked, CompareExchangeError<S, T, R>>
    where
        C: CompareArg<Item = T, Reclaimer = R>,
        S: StoreArg<Item = T, Reclaimer = R>,
    {
        let new = ManuallyDrop::new(new);
        self.inner
            .compare_exchange(current.as_ptr(), new.as_ptr(), success, failure)
            .map(|_| unsafe { current.into_unlinked() })
            .map_err(|loaded| CompareExchangeError {
                loaded: unsafe { Unprotected::from_raw(loaded) },
                input: ManuallyDrop::into_inner(new),
                _private: (),
            })
    }

    /// Stores `new` into the pointer if it still contains `current`.
    ///
    /// Unlike [`compare_exchange`][Atomic::compare_exchange], this function is
    /// allowed to fail spuriously.
    #[inline]
    pub fn compare_exchange_weak<C, S>(
        &self,
        current: C,
        new: S,
        success: Ordering,
        failure: Ordering,
    ) -> Result<C::Unlinked, CompareExchangeError<S, T, R>>
    where
        C: CompareArg<Item = T, Reclaimer = R>,
        S: StoreArg<Item = T, Reclaimer = R>,
    {
        let new = ManuallyDrop::new(new);
        self.inner
            .compare_exchange_weak(current.as_ptr(), new.as_ptr(), success, failure)
            .map(|_| unsafe { current.into_unlinked() })
            .map_err(|loaded| CompareExchangeError {
                loaded: unsafe { Unprotected::from_raw(loaded) },
                input: ManuallyDrop::into_inner(new),
                _private: (),
            })
    }
}

/********** impl Default **************************************************************************/

impl<T, R> Default for Atomic<T, R> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R> fmt::Debug for Atomic<T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Atomic").field("ptr", &self.inner.load(Ordering::SeqCst)).finish()
    }
}

/********** impl From *****************************************************************************/

impl<T, R> From<Owned<T, R>> for Atomic<T, R> {
    #[inline]
    fn from(owned: Owned<T, R>) -> Self {
        unsafe { Self::from_raw(Owned::leak(owned).as_ptr()) }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// StoreArg (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for pointer types that can be stored in an [`Atomic`].
pub trait StoreArg {
    /// The pointed-to type.
    type Item: Sized;
    /// The associated reclamation mechanism.
    type Reclaimer;

    /// Returns the raw pointer that gets stored.
    fn as_ptr(&self) -> *mut Self::Item;
}

/********** impl StoreArg *************************************************************************/

impl<T, R> StoreArg for Owned<T, R> {
    type Item = T;
    type Reclaimer = R;

    #[inline]
    fn as_ptr(&self) -> *mut Self::Item {
        Owned::as_ptr(self)
    }
}

impl<T, R> StoreArg for Shared<'_, T, R> {
    type Item = T;
    type Reclaimer = R;

    #[inline]
    fn as_ptr(&self) -> *mut Self::Item {
        Shared::as_ptr(self)
    }
}

impl<T, R> StoreArg for Unprotected<T, R> {
    type Item = T;
    type Reclaimer = R;

    #[inline]
    fn as_ptr(&self) -> *mut Self::Item {
        self.inner
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// CompareArg (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for pointer types that can be used as the expected value of a
/// *compare-and-swap* operation on an [`Atomic`].
pub trait CompareArg {
    /// The pointed-to type.
    type Item: Sized;
    /// The associated reclamation mechanism.
    type Reclaimer;
    /// The type the argument is converted into if the swap succeeds.
    type Unlinked;

    /// Returns the raw pointer that is compared against.
    fn as_ptr(&self) -> *mut Self::Item;

    /// Converts the argument after a successful swap.
    ///
    /// # Safety
    ///
    /// Must only be called after the pointer has been successfully swapped
    /// out of its previous location.
    unsafe fn into_unlinked(self) -> Self::Unlinked;
}

/********** impl CompareArg ***********************************************************************/

impl<T, R> CompareArg for Shared<'_, T, R> {
    type Item = T;
    type Reclaimer = R;
    type Unlinked = Unlinked<T, R>;

    #[inline]
    fn as_ptr(&self) -> *mut Self::Item {
        Shared::as_ptr(self)
    }

    #[inline]
    unsafe fn into_unlinked(self) -> Self::Unlinked {
        Unlinked::from_non_null(self.inner)
    }
}

impl<T, R> CompareArg for Unprotected<T, R> {
    type Item = T;
    type Reclaimer = R;
    type Unlinked = Self;

    #[inline]
    fn as_ptr(&self) -> *mut Self::Item {
        self.inner
    }

    #[inline]
    unsafe fn into_unlinked(self) -> Self::Unlinked {
        self
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// CompareExchangeError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The returned error type for a failed [`compare_exchange`](Atomic::compare_exchange) or
/// [`compare_exchange_weak`](Atomic::compare_exchange_weak) operation.
#[derive(Debug)]
pub struct CompareExchangeError<S, T, R> {
    /// The actually loaded value
    pub loaded: Unprotected<T, R>,
    /// The value with which the failed swap was attempted
    pub input: S,
    // prevents construction outside of the current module
    _private: (),
}

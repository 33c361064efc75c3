use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};

use crate::retired::Retired;
use crate::Unlinked;

/********** impl Send + Sync **********************************************************************/

unsafe impl<T, R> Send for Unlinked<T, R> where T: Send {}
unsafe impl<T, R> Sync for Unlinked<T, R> where T: Sync {}

/********** impl inherent *************************************************************************/

impl<T, R> Unlinked<T, R> {
    /// Creates a new [`Unlinked`] from a raw non-null pointer.
    ///
    /// # Safety
    ///
    /// The record must have just been removed from the (only) location
    /// through which other threads could have reached it.
    #[inline]
    pub unsafe fn from_non_null(ptr: NonNull<T>) -> Self {
        Self { inner: ptr, _marker: PhantomData }
    }

    impl_non_null_common!();

    /// Returns a reference to the unlinked value.
    ///
    /// The value can not have been reclaimed yet, since this requires
    /// consuming the [`Unlinked`] first.
    #[inline]
    pub fn as_ref(&self) -> &T {
        unsafe { self.inner.as_ref() }
    }

    /// Moves the (manually dropped) field selected by `func` out of the
    /// unlinked value.
    ///
    /// # Safety
    ///
    /// The selected field must not be read, taken or dropped again by anyone
    /// else, including the code that eventually reclaims the record.
    #[inline]
    pub unsafe fn take<U>(&self, func: impl FnOnce(&T) -> &ManuallyDrop<U>) -> U {
        ptr::read(&**func(self.as_ref()))
    }

    /// Converts the [`Unlinked`] into a type-erased [`Retired`] record, which
    /// can be handed to a reclamation mechanism.
    #[inline]
    pub fn into_retired(self) -> Retired {
        unsafe { Retired::new_unchecked(self.inner) }
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R> fmt::Debug for Unlinked<T, R> {
    impl_fmt_debug!(Unlinked);
}

/********** impl Pointer **************************************************************************/

impl<T, R> fmt::Pointer for Unlinked<T, R> {
    impl_fmt_pointer!();
}

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::Unprotected;

/********** impl Clone ****************************************************************************/

impl<T, R> Clone for Unprotected<T, R> {
    #[inline]
    fn clone(&self) -> Self {
        Self { inner: self.inner, _marker: PhantomData }
    }
}

/********** impl Copy *****************************************************************************/

impl<T, R> Copy for Unprotected<T, R> {}

/********** impl inherent *************************************************************************/

impl<T, R> Unprotected<T, R> {
    /// Creates a new `null` pointer.
    #[inline]
    pub const fn null() -> Self {
        Self { inner: ptr::null_mut(), _marker: PhantomData }
    }

    /// Creates a new [`Unprotected`] from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be either `null` or a pointer to a record that was valid
    /// when it was loaded.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self { inner: ptr, _marker: PhantomData }
    }

    /// Returns `true` if the pointer is `null`.
    #[inline]
    pub fn is_null(self) -> bool {
        self.inner.is_null()
    }

    /// Returns the raw pointer.
    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.inner
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R> fmt::Debug for Unprotected<T, R> {
    impl_fmt_debug!(Unprotected);
}

/********** impl Pointer **************************************************************************/

impl<T, R> fmt::Pointer for Unprotected<T, R> {
    impl_fmt_pointer!();
}

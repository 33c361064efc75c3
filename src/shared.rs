use core::borrow::Borrow;
use core::convert::AsRef;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::Shared;

/********** impl Clone ****************************************************************************/

impl<T, R> Clone for Shared<'_, T, R> {
    #[inline]
    fn clone(&self) -> Self {
        Self { inner: self.inner, _marker: PhantomData }
    }
}

/********** impl Copy *****************************************************************************/

impl<T, R> Copy for Shared<'_, T, R> {}

/********** impl inherent *************************************************************************/

impl<'g, T, R> Shared<'g, T, R> {
    /// Creates a new [`Shared`] from a raw non-null pointer.
    ///
    /// # Safety
    ///
    /// The pointed-to value must be protected from reclamation for the entire
    /// lifetime `'g`.
    #[inline]
    pub unsafe fn from_non_null(ptr: NonNull<T>) -> Self {
        Self { inner: ptr, _marker: PhantomData }
    }

    impl_non_null_common!();
}

/********** impl AsRef ****************************************************************************/

impl<T, R> AsRef<T> for Shared<'_, T, R> {
    #[inline]
    fn as_ref(&self) -> &T {
        unsafe { self.inner.as_ref() }
    }
}

/********** impl Borrow ***************************************************************************/

impl<T, R> Borrow<T> for Shared<'_, T, R> {
    #[inline]
    fn borrow(&self) -> &T {
        self.as_ref()
    }
}

/********** impl Deref ****************************************************************************/

impl<T, R> Deref for Shared<'_, T, R> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

/********** impl Debug ****************************************************************************/

impl<T, R> fmt::Debug for Shared<'_, T, R> {
    impl_fmt_debug!(Shared);
}

/********** impl Pointer **************************************************************************/

impl<T, R> fmt::Pointer for Shared<'_, T, R> {
    impl_fmt_pointer!();
}

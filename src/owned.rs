use core::borrow::{Borrow, BorrowMut};
use core::convert::{AsMut, AsRef};
use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use crate::{Owned, Unprotected};

/********** impl Send + Sync **********************************************************************/

unsafe impl<T, R> Send for Owned<T, R> where T: Send {}
unsafe impl<T, R> Sync for Owned<T, R> where T: Sync {}

/********** impl inherent *************************************************************************/

impl<T, R> Owned<T, R> {
    /// Allocates `owned` on the heap and returns an owning handle to it.
    #[inline]
    pub fn new(owned: T) -> Self {
        let inner = NonNull::from(Box::leak(Box::new(owned)));
        Self { inner, _marker: PhantomData }
    }

    /// Consumes the [`Owned`], de-allocates its memory and extracts the
    /// contained value.
    ///
    /// This has the same semantics as destructuring a [`Box`].
    #[inline]
    #[allow(clippy::wrong_self_convention)]
    pub fn into_inner(owned: Self) -> T {
        let owned = ManuallyDrop::new(owned);
        *unsafe { Box::from_raw(owned.inner.as_ptr()) }
    }

    /// Returns the raw pointer to the owned value without giving up
    /// ownership.
    #[inline]
    pub fn as_ptr(owned: &Self) -> *mut T {
        owned.inner.as_ptr()
    }

    /// Returns an [`Unprotected`] copy of the pointer.
    ///
    /// This is mostly useful for keeping a handle to a record whose
    /// ownership is about to be transferred into an [`Atomic`][crate::Atomic]
    /// by a *compare-and-swap*.
    #[inline]
    pub fn as_unprotected(owned: &Self) -> Unprotected<T, R> {
        unsafe { Unprotected::from_raw(owned.inner.as_ptr()) }
    }

    /// Consumes the [`Owned`] and returns the non-null pointer to the
    /// (no longer owned) heap allocation.
    ///
    /// The caller becomes responsible for eventually freeing the record,
    /// usually by storing it in an [`Atomic`][crate::Atomic].
    #[inline]
    pub fn leak(owned: Self) -> NonNull<T> {
        let inner = owned.inner;
        mem::forget(owned);
        inner
    }

    /// Re-acquires ownership of a record previously leaked or stored in an
    /// [`Atomic`][crate::Atomic].
    ///
    /// # Safety
    ///
    /// `ptr` must have been created by [`Owned::leak`] (or equivalently a
    /// record stored in an [`Atomic`][crate::Atomic]) and there must be no
    /// other owner of the same record.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self { inner: ptr, _marker: PhantomData }
    }
}

/********** impl AsRef + AsMut ********************************************************************/

impl<T, R> AsRef<T> for Owned<T, R> {
    #[inline]
    fn as_ref(&self) -> &T {
        unsafe { self.inner.as_ref() }
    }
}

impl<T, R> AsMut<T> for Owned<T, R> {
    #[inline]
    fn as_mut(&mut self) -> &mut T {
        unsafe { self.inner.as_mut() }
    }
}

/********** impl Borrow + BorrowMut ***************************************************************/

impl<T, R> Borrow<T> for Owned<T, R> {
    #[inline]
    fn borrow(&self) -> &T {
        self.as_ref()
    }
}

impl<T, R> BorrowMut<T> for Owned<T, R> {
    #[inline]
    fn borrow_mut(&mut self) -> &mut T {
        self.as_mut()
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug, R> fmt::Debug for Owned<T, R> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Owned").field("value", self.as_ref()).finish()
    }
}

/********** impl Pointer **************************************************************************/

impl<T, R> fmt::Pointer for Owned<T, R> {
    impl_fmt_pointer!();
}

/********** impl Deref + DerefMut *****************************************************************/

impl<T, R> Deref for Owned<T, R> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl<T, R> DerefMut for Owned<T, R> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut()
    }
}

/********** impl Drop *****************************************************************************/

impl<T, R> Drop for Owned<T, R> {
    #[inline]
    fn drop(&mut self) {
        mem::drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    use super::Owned;

    #[test]
    fn into_inner() {
        let owned: Owned<_, ()> = Owned::new(String::from("owned"));
        assert_eq!(Owned::into_inner(owned), "owned");
    }

    #[test]
    fn leak_and_reclaim() {
        let owned: Owned<_, ()> = Owned::new(vec![1, 2, 3]);
        let ptr = Owned::leak(owned);
        let owned: Owned<Vec<i32>, ()> = unsafe { Owned::from_raw(ptr) };
        assert_eq!(&*owned, &[1, 2, 3]);
    }
}

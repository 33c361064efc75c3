//! Pointers that carry an external reference count in their unused upper
//! address bits.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::Ordering;

use crate::sync::AtomicU64;

const ADDR_BITS: u32 = 48;
const ADDR_MASK: u64 = (1 << ADDR_BITS) - 1;

////////////////////////////////////////////////////////////////////////////////////////////////////
// CountedPtr
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A pointer paired with a 16-bit external reference count.
///
/// Both parts are packed into a single 64-bit word, so that they can be read
/// and written as one unit by an [`AtomicCountedPtr`].
/// This relies on user-space addresses fitting into the lower 48 bits, which
/// holds on all current 64-bit platforms.
pub struct CountedPtr<T> {
    raw: u64,
    _marker: PhantomData<*mut T>,
}

/********** impl Clone + Copy *********************************************************************/

impl<T> Clone for CountedPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CountedPtr<T> {}

/********** impl inherent *************************************************************************/

impl<T> CountedPtr<T> {
    /// Creates a new `null` pointer with a count of zero.
    #[inline]
    pub const fn null() -> Self {
        Self { raw: 0, _marker: PhantomData }
    }

    /// Creates a new counted pointer.
    #[inline]
    pub fn new(ptr: *mut T, count: u16) -> Self {
        let addr = ptr as usize as u64;
        debug_assert_eq!(addr & !ADDR_MASK, 0, "address does not fit into 48 bits");
        Self::from_raw((u64::from(count) << ADDR_BITS) | addr)
    }

    #[inline]
    const fn from_raw(raw: u64) -> Self {
        Self { raw, _marker: PhantomData }
    }

    /// Returns the pointer part.
    #[inline]
    pub fn ptr(self) -> *mut T {
        (self.raw & ADDR_MASK) as usize as *mut T
    }

    /// Returns the external count.
    #[inline]
    pub fn count(self) -> u16 {
        (self.raw >> ADDR_BITS) as u16
    }

    /// Returns `true` if the pointer part is `null`, regardless of the count.
    #[inline]
    pub fn is_null(self) -> bool {
        self.raw & ADDR_MASK == 0
    }

    /// Returns the same pointer with a different count.
    #[inline]
    pub fn with_count(self, count: u16) -> Self {
        Self::new(self.ptr(), count)
    }

    /// Returns the same pointer with the count incremented by one.
    #[inline]
    pub fn increment(self) -> Self {
        debug_assert!(self.count() < u16::MAX, "external count overflow");
        self.with_count(self.count().wrapping_add(1))
    }
}

/********** impl PartialEq + Eq *******************************************************************/

impl<T> PartialEq for CountedPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for CountedPtr<T> {}

/********** impl Default **************************************************************************/

impl<T> Default for CountedPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for CountedPtr<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CountedPtr")
            .field("ptr", &self.ptr())
            .field("count", &self.count())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// AtomicCountedPtr
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An atomic [`CountedPtr`].
pub struct AtomicCountedPtr<T> {
    inner: AtomicU64,
    _marker: PhantomData<*mut T>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T> Send for AtomicCountedPtr<T> {}
unsafe impl<T> Sync for AtomicCountedPtr<T> {}

/********** impl inherent *************************************************************************/

impl<T> AtomicCountedPtr<T> {
    /// Creates a new atomic counted pointer.
    #[inline]
    pub fn new(ptr: CountedPtr<T>) -> Self {
        Self { inner: AtomicU64::new(ptr.raw), _marker: PhantomData }
    }

    /// Creates a new `null` pointer with a count of zero.
    #[inline]
    pub fn null() -> Self {
        Self::new(CountedPtr::null())
    }

    /// Loads the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> CountedPtr<T> {
        CountedPtr::from_raw(self.inner.load(order))
    }

    /// Stores a new value.
    #[inline]
    pub fn store(&self, ptr: CountedPtr<T>, order: Ordering) {
        self.inner.store(ptr.raw, order);
    }

    /// Stores `new` if the current value (pointer *and* count) equals
    /// `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: CountedPtr<T>,
        new: CountedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<T>, CountedPtr<T>> {
        self.inner
            .compare_exchange(current.raw, new.raw, success, failure)
            .map(CountedPtr::from_raw)
            .map_err(CountedPtr::from_raw)
    }

    /// Stores `new` if the current value equals `current`, but may fail
    /// spuriously.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: CountedPtr<T>,
        new: CountedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CountedPtr<T>, CountedPtr<T>> {
        self.inner
            .compare_exchange_weak(current.raw, new.raw, success, failure)
            .map(CountedPtr::from_raw)
            .map_err(CountedPtr::from_raw)
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for AtomicCountedPtr<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("AtomicCountedPtr").field(&self.load(Ordering::SeqCst)).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::CountedPtr;

    #[test]
    fn pack_unpack() {
        let mut val = 7u32;
        let raw = &mut val as *mut u32;

        let ptr = CountedPtr::new(raw, 3);
        assert_eq!(ptr.ptr(), raw);
        assert_eq!(ptr.count(), 3);
        assert!(!ptr.is_null());

        let ptr = ptr.increment();
        assert_eq!(ptr.ptr(), raw);
        assert_eq!(ptr.count(), 4);
        assert_eq!(ptr.with_count(0), CountedPtr::new(raw, 0));
    }

    #[test]
    fn null_with_count() {
        let ptr = CountedPtr::<u32>::new(ptr::null_mut(), 5);
        assert!(ptr.is_null());
        assert_eq!(ptr.count(), 5);
        assert_ne!(ptr, CountedPtr::null());
    }
}

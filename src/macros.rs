macro_rules! impl_fmt_debug {
    ($ty_name:ident) => {
        #[inline]
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.debug_struct(stringify!($ty_name)).field("ptr", &self.inner).finish()
        }
    };
}

macro_rules! impl_fmt_pointer {
    () => {
        #[inline]
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            fmt::Pointer::fmt(&self.inner, f)
        }
    };
}

macro_rules! impl_non_null_common {
    () => {
        /// Returns the raw pointer to the referenced value.
        #[inline]
        pub fn as_ptr(&self) -> *mut T {
            self.inner.as_ptr()
        }

        /// Returns an [`Unprotected`][crate::Unprotected] copy of the pointer.
        #[inline]
        pub fn as_unprotected(&self) -> crate::Unprotected<T, R> {
            unsafe { crate::Unprotected::from_raw(self.inner.as_ptr()) }
        }
    };
}

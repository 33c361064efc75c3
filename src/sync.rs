//! Atomic primitives, swapped for their model-checked counterparts when the
//! crate is built with `--cfg loom`.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{fence, AtomicPtr, AtomicU64, AtomicUsize};
        pub(crate) use loom::sync::Arc;
    } else {
        pub(crate) use core::sync::atomic::{fence, AtomicPtr, AtomicU64, AtomicUsize};
        pub(crate) use std::sync::Arc;
    }
}
